use clap::Parser;
use colored::Colorize;
use futures::StreamExt;
use rag_chatbot::api;
use rag_chatbot::commands::{print_help, print_metrics, CommandHandler, CommandOutcome};
use rag_chatbot::config::AppConfig;
use rag_chatbot::session::{ChatSession, DEMO_QUESTIONS};
use rag_chatbot::utils::init_logging;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Chat with your PDF documents", long_about = None)]
struct Args {
    /// Serve the HTTP API instead of the interactive prompt
    #[arg(long)]
    api: bool,

    #[arg(long, default_value = "3000")]
    port: u16,

    /// PDF to load on startup
    #[arg(short, long)]
    file: Option<PathBuf>,

    #[arg(short, long)]
    model: Option<String>,

    #[arg(long)]
    temperature: Option<f32>,

    #[arg(long)]
    max_tokens: Option<u32>,

    #[arg(long)]
    no_memory: bool,

    #[arg(long)]
    no_stream: bool,

    /// Process a PDF, ask the demo questions and write a report
    #[arg(long, value_name = "PDF")]
    demo: Option<PathBuf>,
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    colored::control::set_override(true);

    let args = Args::parse();
    let config = AppConfig::from_env()?;
    init_logging(&config)?;

    let mut session = ChatSession::new(config);
    apply_args(&mut session, &args)?;

    if let Some(pdf) = &args.demo {
        run_demo(session, pdf).await
    } else if args.api {
        run_api_server(session, args.port).await
    } else {
        run_cli_mode(session, &args).await
    }
}

fn apply_args(session: &mut ChatSession, args: &Args) -> Result<(), BoxError> {
    let mut settings = session.settings().clone();
    if let Some(model) = &args.model {
        settings.model = model.clone();
    }
    if let Some(temperature) = args.temperature {
        settings.temperature = temperature;
    }
    if let Some(max_tokens) = args.max_tokens {
        settings.max_tokens = max_tokens;
    }
    settings.use_memory = !args.no_memory;
    settings.use_streaming = !args.no_stream;
    session.update_settings(settings)?;
    Ok(())
}

fn rule() -> String {
    let width = term_size::dimensions().map(|(w, _)| w.min(100)).unwrap_or(80);
    "=".repeat(width)
}

fn print_banner(session: &ChatSession) {
    let config = session.config();
    println!("{}", rule().bright_blue());
    println!("{}", config.app_title.bold());
    println!("{}", config.app_description.dimmed());
    println!(
        "🤖 Model: {}  🧠 Memory: {}  ⚡ Streaming: {}",
        session.settings().model.cyan(),
        session.settings().use_memory,
        session.settings().use_streaming
    );
    println!("{}", rule().bright_blue());
}

async fn run_cli_mode(session: ChatSession, args: &Args) -> Result<(), BoxError> {
    print_banner(&session);
    let mut command_handler = CommandHandler::new(session);

    if let Some(file) = &args.file {
        if let Err(e) = command_handler
            .handle_command(&format!("load {}", file.display()))
            .await
        {
            println!("{}", e.red());
        }
    }

    print_help();

    let mut rl = Editor::<(), DefaultHistory>::new()?;

    loop {
        match rl.readline("👤 ") {
            Ok(line) => {
                let input = line.trim();
                if !input.is_empty() {
                    let _ = rl.add_history_entry(input);
                }

                match command_handler.handle_command(input).await {
                    Ok(CommandOutcome::Exit) => break,
                    Ok(CommandOutcome::Continue) => {}
                    Err(e) => println!("{}", e.red()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }
    Ok(())
}

async fn run_api_server(session: ChatSession, port: u16) -> Result<(), BoxError> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    log::info!("Starting API server on {}", addr);

    let app = api::create_api(session);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    rag_chatbot::success!("Server listening on {}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| format!("Server error: {}", e))?;

    Ok(())
}

async fn run_demo(mut session: ChatSession, pdf: &Path) -> Result<(), BoxError> {
    let name = pdf
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| pdf.display().to_string());

    log::info!("📖 Loading demo document {}", name);
    let info = session
        .process_document(pdf, &name, |stage| log::info!("{}", stage.label()))
        .await?;
    rag_chatbot::success!("Created {} chunks from {}", info.chunks, info.filename);

    println!("\n{}", rule());
    println!("{}", "🎯 RAG CHATBOT DEMO".bold());
    println!("{}", rule());

    let mut stdout = std::io::stdout();
    for (i, question) in DEMO_QUESTIONS.iter().enumerate() {
        println!("\n🔸 Question {}: {}", i + 1, question.bright_yellow());
        println!("{}", "-".repeat(60));
        print!("🤖 Answer: ");
        let _ = stdout.flush();

        let mut answer = String::new();
        let mut tokens = session.ask_stream(question)?;
        while let Some(token) = tokens.next().await {
            print!("{}", token);
            let _ = stdout.flush();
            answer.push_str(&token);
        }
        println!("\n");
        session.record_exchange(question, &answer);
    }

    println!("{}", rule());
    println!("{}", "📊 METRICS & STATISTICS".bold());
    println!("{}", rule());
    print_metrics(&session.metrics());
    if let Some(info) = session.pipeline_info() {
        println!("🧠 Memory size: {}", info.memory_size);
        println!("🔧 Retriever type: {}", info.retriever_type);
    }

    let filename = format!("demo_report_{}.json", chrono::Local::now().format("%Y%m%d_%H%M%S"));
    let path = session.write_report(&session.config().report_dir.join(filename))?;
    println!("\n📄 Report saved to {}", path.display());
    rag_chatbot::success!("Demo finished");
    Ok(())
}
