use super::print_answer;
use crate::session::{ChatSession, QUICK_QUESTIONS};
use colored::Colorize;
use futures::StreamExt;
use std::io::Write;

pub async fn ask(session: &mut ChatSession, question: &str) -> Result<(), String> {
    if !session.settings().use_streaming {
        let answer = session.ask(question).await.map_err(|e| e.to_string())?;
        print_answer(&answer);
        return Ok(());
    }

    let mut tokens = session.ask_stream(question).map_err(|e| e.to_string())?;
    let mut answer = String::new();
    let mut stdout = std::io::stdout();
    while let Some(token) = tokens.next().await {
        print!("{}", token.truecolor(255, 236, 179));
        let _ = stdout.flush();
        answer.push_str(&token);
    }
    println!("\n");

    session.record_exchange(question, &answer);
    Ok(())
}

pub async fn quick(session: &mut ChatSession, choice: &str) -> Result<(), String> {
    if choice.is_empty() {
        println!("\n💡 Suggested questions:");
        for (i, question) in QUICK_QUESTIONS.iter().enumerate() {
            println!("  {}. {}", i + 1, question);
        }
        println!("\nUse: quick <number>");
        return Ok(());
    }

    let question = choice
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| QUICK_QUESTIONS.get(i))
        .ok_or_else(|| format!("Choose a question between 1 and {}", QUICK_QUESTIONS.len()))?;

    println!("💭 {}", question.bright_yellow());
    ask(session, question).await
}

pub fn history(session: &ChatSession) -> Result<(), String> {
    let history = session.chat_history();
    if history.is_empty() {
        println!("No questions asked yet.");
        return Ok(());
    }

    println!("\n💬 Chat History:");
    for (i, exchange) in history.iter().enumerate() {
        println!(
            "\n{} {} {}",
            format!("[{}]", i + 1).cyan(),
            exchange.timestamp.format("%H:%M:%S").to_string().dimmed(),
            exchange.question.bright_yellow()
        );
        println!("{}", exchange.answer);
    }
    println!();
    Ok(())
}

pub fn clear(session: &mut ChatSession) -> Result<(), String> {
    session.clear_history();
    println!("🗑️ Chat history cleared");
    Ok(())
}
