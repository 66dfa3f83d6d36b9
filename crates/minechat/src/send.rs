use crate::config::RuntimeConfig;
use crate::credentials::{resolve_credential, CredentialStore, StoredCredential};
use crate::history::HistoryWriter;
use anyhow::{Context, Result};
use minechat_core::frame::sanitize_payload;
use minechat_core::writer::{WriterTimeouts, INVALID_TOKEN_ALERT};
use minechat_core::{send_once, AuditEntry, Connector, SessionError};
use tokio::sync::mpsc;
use tracing::{error, info};

/// One-shot send: returns the process exit code.
pub async fn run_send<C>(config: &RuntimeConfig, connector: &C, message: &str) -> Result<i32>
where
    C: Connector,
{
    let store = CredentialStore::new(&config.credentials_path);
    let credential =
        resolve_credential(config.key.as_deref(), config.user_name.as_deref(), &store).await?;

    let identity = match send_once(
        connector,
        &config.write_endpoint(),
        &credential,
        message,
        WriterTimeouts::default(),
    )
    .await
    {
        Ok(identity) => identity,
        Err(SessionError::InvalidToken) => {
            error!(event = "send_invalid_token", endpoint = %config.write_endpoint());
            eprintln!("{INVALID_TOKEN_ALERT}");
            return Ok(1);
        }
        Err(err) => {
            return Err(err).with_context(|| format!("sending to {}", config.write_endpoint()))
        }
    };

    if let Some(token) = identity.issued_token.clone() {
        store
            .save(&StoredCredential {
                nickname: identity.nickname.clone(),
                account_hash: token,
            })
            .await?;
        println!(
            "Registered as {}; credentials saved to {}",
            identity.nickname,
            store.path().display()
        );
    }

    let (audit_tx, audit_rx) = mpsc::channel(1);
    let writer = tokio::spawn(HistoryWriter::new(config.history_path.clone()).run(audit_rx));
    let _ = audit_tx.send(AuditEntry::sent(sanitize_payload(message))).await;
    drop(audit_tx);
    let _ = writer.await;

    info!(event = "send_done", nickname = %identity.nickname);
    println!("Message sent as {}", identity.nickname);
    Ok(0)
}
