use anyhow::Result;

use crate::config::MemsiftConfig;
use crate::retrieval::RetrievalRequest;

pub struct SearchArgs<'a> {
    pub owner_id: &'a str,
    pub query: &'a str,
    pub top_k: Option<usize>,
    pub threshold: Option<f64>,
    pub filters: &'a [String],
    pub json: bool,
}

/// Run a ranked search from the terminal.
pub async fn search(config: &MemsiftConfig, args: SearchArgs<'_>) -> Result<()> {
    let filters = super::parse_filters(args.filters)?;
    let engine = super::open_engine(config)?;

    let mut request = RetrievalRequest::new(args.query, args.owner_id).filters(filters);
    request.top_k = args.top_k;
    request.threshold = args.threshold;

    let response = engine.retriever.retrieve(request).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if let Some(source) = response.degraded {
        println!("Warning: {source:?} search failed; results are partial.\n");
    }

    if response.results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    for result in &response.results {
        let preview: String = result.text.chars().take(120).collect();
        let ellipsis = if preview.len() < result.text.len() { "..." } else { "" };
        println!(
            "  {}. {} (score: {:.4}, via {:?})",
            result.rank, result.memory_id, result.final_score, result.source,
        );
        println!("     {preview}{ellipsis}");
        println!();
    }

    Ok(())
}
