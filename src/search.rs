use crate::config::Config;
use crate::embedding::{Embedder, OpenAiEmbedder};
use crate::store::{VectorStore, TEAM_KNOWLEDGE, TICKETS};

pub async fn run_search(config: &Config, query: &str, k: Option<usize>) -> anyhow::Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let store = VectorStore::open(config).await?;
    store.load(TICKETS).await?;

    let embedder = OpenAiEmbedder::new(&config.embedding)?;
    let embedding = embedder.embed(query).await?;
    let hits = store
        .search_tickets(&embedding, k.unwrap_or(config.retrieval.top_k))
        .await?;

    if hits.is_empty() {
        println!("No results.");
        store.close().await;
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.4}] {} / {}",
            i + 1,
            hit.distance,
            hit.ticket.ticket_id,
            hit.ticket.machine_model
        );
        println!("    issue: {}", hit.ticket.issue_description);
        if !hit.ticket.resolution_solution.is_empty() {
            println!("    resolution: {}", hit.ticket.resolution_solution);
        }
        if !hit.ticket.root_cause.is_empty() {
            println!("    root cause: {}", hit.ticket.root_cause);
        }
        println!(
            "    customer: {} / priority: {} / status: {}",
            hit.ticket.customer, hit.ticket.priority, hit.ticket.status
        );
        println!();
    }

    store.close().await;
    Ok(())
}

pub async fn run_team_search(config: &Config, query: &str, k: Option<usize>) -> anyhow::Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let store = VectorStore::open(config).await?;
    store.load(TEAM_KNOWLEDGE).await?;

    let embedder = OpenAiEmbedder::new(&config.embedding)?;
    let embedding = embedder.embed(query).await?;
    let hits = store
        .search_team_members(&embedding, k.unwrap_or(config.retrieval.top_k))
        .await?;

    if hits.is_empty() {
        println!("No results.");
        store.close().await;
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.4}] {} / {}",
            i + 1,
            hit.distance,
            hit.member.employee_id,
            hit.member.name
        );
        println!("    role: {}", hit.member.role);
        println!("    skills: {}", hit.member.skills.join(", "));
        println!(
            "    region: {} / experience: {} years",
            hit.member.region, hit.member.experience_years
        );
        println!();
    }

    store.close().await;
    Ok(())
}
