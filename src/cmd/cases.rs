//! Read-only case views — `gavel list`, `gavel show`, `gavel log`.

use anyhow::Result;
use console::style;

use super::open_store;
use gavel::config::GavelConfig;
use gavel::store::Case;

pub async fn cmd_list(config: &GavelConfig) -> Result<()> {
    let store = open_store(config)?;
    let (expected, cases) = store
        .call(|s| Ok((s.expected_case_num()?, s.list_available()?)))
        .await?;

    if let Some(number) = expected {
        println!(
            "Next expected docket number: {}\n",
            style(number).bold().cyan()
        );
    }

    if cases.is_empty() {
        println!("No cases available for review.");
        return Ok(());
    }

    println!("{}", style("Cases available for review").bold());
    for case in &cases {
        let judge = case.current_judge.as_deref().unwrap_or("unassigned");
        println!(
            "  {:>4}) No. {:<12} [{}] ({})",
            case.id,
            case.docket_display(),
            case.status.label(),
            judge,
        );
    }
    Ok(())
}

pub async fn cmd_show(config: &GavelConfig, id: i64) -> Result<()> {
    let store = open_store(config)?;
    let case = store.call(move |s| s.get_case(id)).await?;
    let Some(case) = case else {
        anyhow::bail!("Case {} not found", id);
    };
    print_case(&case);
    Ok(())
}

fn print_case(case: &Case) {
    println!(
        "{} (id {})",
        style(format!("Case No. {}", case.docket_display())).bold(),
        case.id
    );
    println!("  Status:    {} ({})", case.status.label(), case.status.as_str());
    println!("  Applicant: {}", case.applicant_name);
    println!("  Officer:   {}", case.officer_name);
    println!(
        "  Judge:     {}",
        case.current_judge.as_deref().unwrap_or("unassigned")
    );
    println!("  Thread:    {}", case.topic_link);
    if let Some(published) = &case.publication_time {
        println!("  Published: {}", published);
    }
    println!("  Posts:     {}", case.post_count);
    if let Some(path) = &case.screenshot_path {
        println!("  Shot:      {}", path);
    }
    if !case.media_references.is_empty() {
        println!("  Evidence:");
        for link in case.media_references.iter().take(3) {
            println!("    {}", link);
        }
        if case.media_references.len() > 3 {
            println!("    ... and {} more", case.media_references.len() - 3);
        }
    }
    if let Some(text) = &case.full_text {
        println!("\n{}", style("Full text").bold());
        println!("{}", text);
    }
}

pub async fn cmd_log(config: &GavelConfig, id: i64) -> Result<()> {
    let store = open_store(config)?;
    let case = store.call(move |s| s.get_case(id)).await?;
    let Some(case) = case else {
        anyhow::bail!("Case {} not found", id);
    };

    println!(
        "{}",
        style(format!("History of case No. {}", case.docket_display())).bold()
    );
    println!("[{}] Ingested by the detector.", case.scraped_at);
    if case.notes.is_empty() {
        return Ok(());
    }
    for line in case.notes.lines() {
        println!("{}", line);
    }
    Ok(())
}
