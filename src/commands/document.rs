use crate::session::ChatSession;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

pub async fn load(session: &mut ChatSession, file_path: &str) -> Result<(), String> {
    let path = Path::new(file_path.trim_matches(|c| c == '"' || c == '\''));
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_path.to_string());

    println!("📄 Processing document: {}", name.bright_yellow());

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let result = session
        .process_document(path, &name, |stage| {
            pb.set_position(stage.percent() as u64);
            pb.set_message(stage.label());
        })
        .await;

    match result {
        Ok(info) => {
            pb.finish_and_clear();
            println!(
                "🎉 Processed successfully! Created {} chunks from the document.",
                info.chunks.to_string().bright_green()
            );
            if let Some(store) = session.store_info() {
                if store.using_fallback {
                    println!("{}", "⚠️ Vector database unavailable, using the in-memory index".yellow());
                }
            }
            Ok(())
        }
        Err(e) => {
            pb.abandon();
            Err(format!("Failed to process document: {}", e))
        }
    }
}

pub fn info(session: &ChatSession) -> Result<(), String> {
    let doc = session
        .document()
        .ok_or("No document loaded. Use: load <file.pdf>")?;

    println!("\n📄 Document Information:");
    println!("Name: {}", doc.filename.bright_yellow());
    println!("Size: {} MB ({} bytes)", format!("{:.2}", doc.size_mb).bright_green(), doc.size_bytes);
    println!("Last modified: {}", doc.modified);
    println!("Chunks: {}", doc.chunks.to_string().bright_cyan());
    println!("Language: {}", doc.language.as_deref().unwrap_or("unknown"));
    if let Some(store) = session.store_info() {
        println!(
            "Vector store: {}{}",
            store.store_type.bright_cyan(),
            if store.using_fallback { " (fallback)" } else { "" }
        );
    }
    println!();
    Ok(())
}

pub fn clear_cache(session: &ChatSession) -> Result<(), String> {
    let removed = session.clear_cache();
    println!("🧹 Removed {} cache entries", removed.to_string().cyan());
    Ok(())
}
