use crate::config::MODEL_OPTIONS;
use crate::session::{ChatSession, Settings};
use colored::Colorize;

fn apply<F>(session: &mut ChatSession, change: F) -> Result<(), String>
where
    F: FnOnce(&mut Settings),
{
    let mut settings = session.settings().clone();
    change(&mut settings);
    session.update_settings(settings).map_err(|e| e.to_string())
}

pub fn list_models(session: &ChatSession) -> Result<(), String> {
    println!("\n🤖 Suggested Models:");
    println!("  Currently using: {}", session.settings().model.cyan());
    println!();
    for (i, model) in MODEL_OPTIONS.iter().enumerate() {
        let marker = if *model == session.settings().model { "✅" } else { "  " };
        println!("  {} {}. {}", marker, i + 1, model);
    }
    println!("\nTo switch models, use: model <name|number>");
    Ok(())
}

pub fn model(session: &mut ChatSession, name: &str) -> Result<(), String> {
    if name.is_empty() {
        println!("🤖 Model: {}", session.settings().model.cyan());
        return Ok(());
    }

    let model = match name.parse::<usize>() {
        Ok(n) => n
            .checked_sub(1)
            .and_then(|i| MODEL_OPTIONS.get(i))
            .map(|model| model.to_string())
            .ok_or_else(|| format!("Choose a model between 1 and {}", MODEL_OPTIONS.len()))?,
        Err(_) => name.to_string(),
    };

    apply(session, |s| s.model = model.clone())?;
    println!("🔄 Switched to {}", model.cyan());
    Ok(())
}

pub fn temperature(session: &mut ChatSession, value: &str) -> Result<(), String> {
    let temperature: f32 = value
        .parse()
        .map_err(|_| "Usage: temp <0.0-2.0>".to_string())?;
    apply(session, |s| s.temperature = temperature)?;
    println!("🌡️ Temperature set to {}", temperature.to_string().cyan());
    Ok(())
}

pub fn max_tokens(session: &mut ChatSession, value: &str) -> Result<(), String> {
    let max_tokens: u32 = value
        .parse()
        .map_err(|_| "Usage: tokens <number>".to_string())?;
    apply(session, |s| s.max_tokens = max_tokens)?;
    println!("📏 Max tokens set to {}", max_tokens.to_string().cyan());
    Ok(())
}

pub fn toggle<F>(session: &mut ChatSession, change: F, label: &str, enabled: bool) -> Result<(), String>
where
    F: FnOnce(&mut Settings),
{
    apply(session, change)?;
    let state = if enabled { "on".green() } else { "off".red() };
    println!("{} {}", label, state);
    Ok(())
}

pub async fn ping(session: &ChatSession) -> Result<(), String> {
    println!("📡 Testing connection to {}...", session.settings().model.cyan());
    let report = session.test_connection().await.map_err(|e| e.to_string())?;
    match (report.response, report.error) {
        (Some(response), _) => {
            println!("{} {}", "✅ Connected:".green(), response);
            Ok(())
        }
        (None, Some(error)) => Err(format!("❌ Connection failed: {}", error)),
        (None, None) => Err("❌ Connection failed".to_string()),
    }
}
