// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subcommand implementations.
//!
//! Every identity-scoped command first makes `--user` the active identity,
//! which also issues the forced resync, then answers from the resolver.

use colored::Colorize;
use secrecy::SecretString;
use serde::Serialize;

use tollgate_core::{AccessType, ContentId, Identity, TollgateError};
use tollgate_session::SessionManager;

/// `check --json` output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessReport {
    pub content_id: String,
    pub has_access: bool,
    pub remaining_days: Option<i64>,
    pub access_type: Option<AccessType>,
}

async fn activate(
    manager: &SessionManager,
    user: &str,
    token: Option<String>,
) -> Result<Identity, TollgateError> {
    let identity = Identity::new(user)?;
    manager
        .switch_identity(identity.clone(), token.map(SecretString::from))
        .await?;
    Ok(identity)
}

pub async fn check(
    manager: &SessionManager,
    content: &str,
    user: &str,
    token: Option<String>,
    json: bool,
) -> Result<(), TollgateError> {
    activate(manager, user, token).await?;
    let content_id = ContentId::new(content);
    let has_access = manager.has_access(&content_id).await?;
    let remaining_days = manager.remaining_days(&content_id).await?;
    let access_type = manager
        .resolver()?
        .entitlement(&content_id)
        .await
        .map(|record| record.access_type);

    let report = AccessReport {
        content_id: content_id.to_string(),
        has_access,
        remaining_days,
        access_type,
    };

    if json {
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| TollgateError::Internal(format!("failed to encode report: {e}")))?;
        println!("{out}");
        return Ok(());
    }

    let verdict = if report.has_access {
        "access granted".green().bold()
    } else {
        "no access".red().bold()
    };
    let detail = match (report.access_type, report.remaining_days) {
        (Some(kind), Some(days)) => format!(" ({kind}, {days} days left)"),
        (Some(kind), None) => format!(" ({kind})"),
        (None, _) => String::new(),
    };
    println!("{}: {verdict}{}", report.content_id.bold(), detail.dimmed());
    Ok(())
}

pub async fn remaining(
    manager: &SessionManager,
    content: &str,
    user: &str,
) -> Result<(), TollgateError> {
    activate(manager, user, None).await?;
    match manager.remaining_days(&ContentId::new(content)).await? {
        Some(days) => println!("{days}"),
        None => println!("{}", "unlimited or not applicable".dimmed()),
    }
    Ok(())
}

pub async fn sync(manager: &SessionManager, user: &str) -> Result<(), TollgateError> {
    activate(manager, user, None).await?;
    let bundles = manager.refresh_catalog().await?;
    for bundle in bundles {
        let status = match (bundle.is_paid, bundle.has_access) {
            (false, _) => "free".cyan(),
            (true, Some(true)) => "unlocked".green(),
            (true, Some(false)) => "locked".red(),
            (true, None) => "unknown".yellow(),
        };
        let title = if bundle.title.is_empty() {
            bundle.id.to_string()
        } else {
            bundle.title.clone()
        };
        println!("  {:<10} {} {}", status, bundle.id, title.dimmed());
    }
    Ok(())
}

pub async fn redeem(manager: &SessionManager, code: &str, user: &str) -> Result<(), TollgateError> {
    activate(manager, user, None).await?;
    let record = manager.redeem_code(code).await?;
    let days = record
        .remaining_days
        .map(|d| format!("{d} days"))
        .unwrap_or_else(|| "no expiry".to_string());
    println!(
        "{} {} unlocked ({days})",
        "redeemed:".green().bold(),
        record.content_id
    );
    Ok(())
}

pub async fn accounts(manager: &SessionManager) -> Result<(), TollgateError> {
    let identities = manager.known_identities().await?;
    if identities.is_empty() {
        println!("{}", "no stored accounts".dimmed());
    }
    for identity in identities {
        println!("  {identity}");
    }
    Ok(())
}

pub async fn logout(manager: &SessionManager, user: &str) -> Result<(), TollgateError> {
    activate(manager, user, None).await?;
    manager.logout().await?;
    println!("{} {user}", "logged out".yellow());
    Ok(())
}
