use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse PDF: {0}")]
    Pdf(String),
    #[error("No readable text found in {0}")]
    Empty(PathBuf),
    #[error("Chunking failed: {0}")]
    Chunking(String),
}

/// Text of one PDF page, numbered from 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub number: u32,
    pub text: String,
}

/// Numbers extracted page texts from 1, dropping blank pages but keeping
/// the numbers of the pages that remain.
pub fn number_pages(texts: Vec<String>) -> Vec<Page> {
    texts
        .into_iter()
        .enumerate()
        .filter_map(|(i, page)| {
            let page = page.trim();
            (!page.is_empty()).then(|| Page {
                number: i as u32 + 1,
                text: page.to_string(),
            })
        })
        .collect()
}

/// Extracts page texts from a PDF on a blocking thread. Parser panics are
/// reported as [`DocumentError::Pdf`].
pub async fn load_pdf(path: &Path) -> Result<Vec<Page>, DocumentError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| DocumentError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let texts = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem_by_pages(&bytes))
        .await
        .map_err(|e| DocumentError::Pdf(format!("PDF parser crashed: {}", e)))?
        .map_err(|e| DocumentError::Pdf(e.to_string()))?;

    let pages = number_pages(texts);
    if pages.is_empty() {
        return Err(DocumentError::Empty(path.to_path_buf()));
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal PDF with one Helvetica text line per page.
    fn pdf_with_pages(lines: &[&str]) -> Vec<u8> {
        let page_ids: Vec<usize> = (0..lines.len()).map(|i| 4 + 2 * i).collect();
        let kids = page_ids
            .iter()
            .map(|id| format!("{} 0 R", id))
            .collect::<Vec<_>>()
            .join(" ");

        let mut objects = vec![
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids, lines.len()),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        ];
        for (i, line) in lines.iter().enumerate() {
            let content = format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET", line);
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                 /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
                page_ids[i] + 1
            ));
            objects.push(format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content));
        }

        let mut pdf = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, object) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, object).as_bytes());
        }
        let xref_start = pdf.len();
        pdf.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
        for offset in offsets {
            pdf.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        pdf.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                xref_start
            )
            .as_bytes(),
        );
        pdf
    }

    #[test]
    fn blank_pages_keep_later_numbers() {
        let pages = number_pages(vec![
            "Intro text\n".to_string(),
            "   ".to_string(),
            "Third page".to_string(),
        ]);
        assert_eq!(
            pages,
            vec![
                Page { number: 1, text: "Intro text".to_string() },
                Page { number: 3, text: "Third page".to_string() },
            ]
        );
    }

    #[tokio::test]
    async fn each_pdf_page_is_loaded_separately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.pdf");
        std::fs::write(
            &path,
            pdf_with_pages(&["The warranty lasts two years.", "Returns are accepted within thirty days."]),
        )
        .unwrap();

        let pages = load_pdf(&path).await.unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, 1);
        assert!(pages[0].text.contains("warranty lasts two years"));
        assert!(!pages[0].text.contains("Returns"));
        assert_eq!(pages[1].number, 2);
        assert!(pages[1].text.contains("Returns are accepted within thirty days"));
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let err = load_pdf(Path::new("/definitely/not/here.pdf")).await.unwrap_err();
        assert!(matches!(err, DocumentError::Io { .. }));
    }

    #[tokio::test]
    async fn garbage_bytes_are_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        std::fs::write(&path, b"this is not a pdf at all").unwrap();

        let err = load_pdf(&path).await.unwrap_err();
        assert!(matches!(err, DocumentError::Pdf(_)));
    }
}
