use crate::session::ChatSession;
use crate::utils::SessionMetrics;
use colored::Colorize;
use std::path::Path;

pub fn print_metrics(metrics: &SessionMetrics) {
    println!("📈 Questions asked: {}", metrics.questions_asked.to_string().cyan());
    println!("📄 Documents processed: {}", metrics.documents_processed.to_string().cyan());
    println!("🧩 Total chunks: {}", metrics.total_chunks.to_string().cyan());
    println!(
        "⏱️ Average response time: {}",
        format!("{:.2}s", metrics.average_response_time).cyan()
    );
    println!("❌ Errors: {}", metrics.errors.to_string().red());
}

pub fn metrics(session: &ChatSession) -> Result<(), String> {
    println!("\n📊 Session Metrics:");
    print_metrics(&session.metrics());
    if let Some(info) = session.pipeline_info() {
        println!("🧠 Memory: {}/{}", info.memory_size, info.max_history);
        println!("🔧 Retriever type: {}", info.retriever_type);
        println!("🤖 Model: {}", info.llm_model);
    }
    println!();
    Ok(())
}

pub fn export(session: &ChatSession, dir: &str) -> Result<(), String> {
    let dir = if dir.is_empty() {
        session.config().report_dir.clone()
    } else {
        Path::new(dir).to_path_buf()
    };
    let path = session.export_report(&dir).map_err(|e| e.to_string())?;
    println!("📄 Report saved to {}", path.display().to_string().bright_green());
    Ok(())
}
