use super::CommandOutcome;
use colored::Colorize;

pub fn print_help() {
    println!("\n{}", "📚 PDF Chat Commands:".bold());
    println!("  Just type a question about the loaded document");
    println!("  Examples:");
    println!("    - what is this document about?");
    println!("    - summarize the conclusions on page 4");
    println!();

    println!("📄 Document Commands:");
    println!("  load <file.pdf>   - Load and index a PDF");
    println!("  info              - Show the loaded document");
    println!("  cache clear       - Remove cached chunk lists");
    println!();

    println!("💬 Chat Commands:");
    println!("  ask <question>    - Ask about the document");
    println!("  quick [n]         - List or ask a suggested question");
    println!("  history           - Show this session's questions and answers");
    println!("  clear             - Clear chat history and conversation memory");
    println!();

    println!("⚙️ Settings Commands:");
    println!("  models            - List suggested models");
    println!("  model [name|n]    - Show or switch the model");
    println!("  temp <0.0-2.0>    - Set the temperature");
    println!("  tokens <n>        - Set the maximum answer length");
    println!("  memory on|off     - Toggle conversation memory");
    println!("  stream on|off     - Toggle streamed answers");
    println!("  ping              - Test the connection to the model");
    println!();

    println!("📊 Report Commands:");
    println!("  metrics           - Show session metrics");
    println!("  report [dir]      - Export a JSON session report");
    println!();

    println!("🔧 System Commands:");
    println!("  help  - Show this help menu");
    println!("  exit  - Exit the program");
    println!();
}

pub fn handle_command(input: &str) -> Result<CommandOutcome, String> {
    match input.to_lowercase().as_str() {
        "help" => {
            print_help();
            Ok(CommandOutcome::Continue)
        }
        "exit" | "quit" => {
            println!("👋 Goodbye!");
            Ok(CommandOutcome::Exit)
        }
        _ => Err("Unknown system command. Type 'help' for available commands.".to_string()),
    }
}
