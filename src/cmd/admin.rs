//! Store administration — whitelist, identities, counter, templates, and
//! manual case overrides.

use anyhow::Result;
use console::style;

use super::open_store;
use gavel::config::GavelConfig;
use gavel::store::{CaseStatus, Identity, TemplateKind};

// ── Judge whitelist ───────────────────────────────────────────────────

pub async fn cmd_judges_add(config: &GavelConfig, nickname: &str) -> Result<()> {
    let store = open_store(config)?;
    let nick = nickname.to_string();
    if store.call(move |s| s.add_judge(&nick)).await? {
        println!("{} Judge {} added to the whitelist.", style("✔").green(), nickname);
    } else {
        println!("Judge {} is already whitelisted.", nickname);
    }
    Ok(())
}

pub async fn cmd_judges_remove(config: &GavelConfig, nickname: &str) -> Result<()> {
    let store = open_store(config)?;
    let nick = nickname.to_string();
    if store.call(move |s| s.remove_judge(&nick)).await? {
        println!(
            "{} Judge {} removed from the whitelist.",
            style("✔").green(),
            nickname
        );
    } else {
        println!("Judge {} was not on the whitelist.", nickname);
    }
    Ok(())
}

pub async fn cmd_judges(config: &GavelConfig) -> Result<()> {
    let store = open_store(config)?;
    let judges = store.call(|s| s.list_judges()).await?;
    if judges.is_empty() {
        println!("The judge whitelist is empty.");
        return Ok(());
    }
    println!("{}", style("Whitelisted judges").bold());
    for judge in judges {
        println!("  {}", judge);
    }
    Ok(())
}

// ── Identities ────────────────────────────────────────────────────────

pub async fn cmd_identity_set(
    config: &GavelConfig,
    nickname: &str,
    encrypted_secret: &str,
    external_id: Option<&str>,
    owner: bool,
) -> Result<()> {
    let store = open_store(config)?;
    let identity = Identity {
        nickname: nickname.to_string(),
        encrypted_secret: encrypted_secret.to_string(),
        external_id: external_id.map(str::to_string),
        is_owner: owner,
    };
    store.call(move |s| s.upsert_identity(&identity)).await?;
    println!(
        "{} Identity {} stored{}.",
        style("✔").green(),
        nickname,
        if owner { " as the owner" } else { "" }
    );
    Ok(())
}

pub async fn cmd_identity_remove(config: &GavelConfig, nickname: &str) -> Result<()> {
    let store = open_store(config)?;
    let nick = nickname.to_string();
    if store.call(move |s| s.remove_identity(&nick)).await? {
        println!("{} Identity {} removed.", style("✔").green(), nickname);
    } else {
        println!("No identity stored for {}.", nickname);
    }
    Ok(())
}

pub async fn cmd_identity(config: &GavelConfig) -> Result<()> {
    let store = open_store(config)?;
    let identities = store.call(|s| s.list_identities()).await?;
    if identities.is_empty() {
        println!("No forum identities stored.");
        return Ok(());
    }
    println!("{}", style("Forum identities").bold());
    for identity in identities {
        println!(
            "  {}{}{}",
            identity.nickname,
            if identity.is_owner { " (owner)" } else { "" },
            identity
                .external_id
                .map(|id| format!(" [external id: {}]", id))
                .unwrap_or_default(),
        );
    }
    Ok(())
}

// ── Expected docket number ────────────────────────────────────────────

pub async fn cmd_counter(config: &GavelConfig, set: Option<&str>) -> Result<()> {
    let store = open_store(config)?;
    match set {
        Some(value) => {
            let number: i64 = value
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("The docket number must be a non-negative integer"))?;
            if number < 0 {
                anyhow::bail!("The docket number must be a non-negative integer");
            }
            let stored = number.to_string();
            store
                .call(move |s| s.set_expected_case_num(&stored))
                .await?;
            println!(
                "{} Next expected docket number set to {}.",
                style("✔").green(),
                number
            );
        }
        None => match store.call(|s| s.expected_case_num()).await? {
            Some(number) => println!("Next expected docket number: {}", style(number).bold()),
            None => println!(
                "The docket counter is not set. Set it with: gavel counter <number>"
            ),
        },
    }
    Ok(())
}

// ── Templates ─────────────────────────────────────────────────────────

pub async fn cmd_template_set(config: &GavelConfig, kind: &str, body: &str) -> Result<()> {
    let store = open_store(config)?;
    let kind: TemplateKind = kind.parse().map_err(anyhow::Error::msg)?;
    let stored = body.to_string();
    store.call(move |s| s.set_template(kind, &stored)).await?;
    println!("{} Template '{}' stored.", style("✔").green(), kind.as_str());
    Ok(())
}

pub async fn cmd_template(config: &GavelConfig) -> Result<()> {
    let store = open_store(config)?;
    let templates = store.call(|s| s.list_templates()).await?;

    println!("{}", style("Reply templates").bold());
    for kind in TemplateKind::all() {
        match templates.iter().find(|(k, _)| k.as_str() == kind.as_str()) {
            Some((_, body)) => {
                let preview: String = body.chars().take(60).collect();
                println!("  {:<22} {}", kind.as_str(), preview);
            }
            None => println!(
                "  {:<22} {}",
                kind.as_str(),
                style("(missing — decisions using it will be refused)").red()
            ),
        }
    }
    Ok(())
}

// ── Manual overrides ──────────────────────────────────────────────────

/// Force-set case fields, bypassing workflow validation. The override is
/// still audited.
pub async fn cmd_override(
    config: &GavelConfig,
    id: i64,
    status: Option<&str>,
    judge: Option<&str>,
    clear_judge: bool,
) -> Result<()> {
    if status.is_none() && judge.is_none() && !clear_judge {
        anyhow::bail!("Nothing to override; pass --status, --judge, or --clear-judge");
    }

    let store = open_store(config)?;
    let parsed_status = status
        .map(|s| {
            s.parse::<CaseStatus>()
                .map_err(anyhow::Error::msg)
        })
        .transpose()?;
    let new_judge = judge.map(str::to_string);

    let exists = store.call(move |s| s.get_case(id)).await?.is_some();
    if !exists {
        anyhow::bail!("Case {} not found", id);
    }

    let judge_for_note = new_judge.clone();
    store
        .call(move |s| {
            if let Some(status) = parsed_status {
                s.update_status(id, status)?;
                s.append_note(id, &format!("Status forced to '{}' by the operator", status.as_str()))?;
            }
            if clear_judge {
                s.set_judge(id, None)?;
                s.append_note(id, "Judge cleared by the operator")?;
            } else if let Some(judge) = &judge_for_note {
                s.set_judge(id, Some(judge))?;
                s.append_note(id, &format!("Judge forced to {} by the operator", judge))?;
            }
            Ok(())
        })
        .await?;

    println!("{} Case {} updated.", style("✔").green(), id);
    Ok(())
}
