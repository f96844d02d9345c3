//! Auth command - authorize one of the two accounts
//!
//! Provides the `drivemirror auth <source|destination>` CLI command which:
//! 1. Builds the OAuth2 authorization URL (with PKCE) for the account's app
//! 2. Prints it and waits for the user to paste the redirect URL or code
//! 3. Exchanges the code for tokens
//! 4. Stores the tokens in the per-account token file

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;
use drivemirror_graph::auth::{parse_authorization_code, OAuthFlow};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::info;

use crate::commands::{load_config, AccountRole};
use crate::output::{get_formatter, OutputFormat};
use crate::token_store::TokenStore;

#[derive(Debug, Args)]
pub struct AuthCommand {
    /// Account to authorize
    #[arg(value_enum)]
    pub account: AccountRole,
}

impl AuthCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let config = load_config(config_path)?;
        let account_config = self.account.account_config(&config);
        if account_config.client_id.trim().is_empty() {
            bail!(
                "accounts.{}.client_id is not set in {}",
                self.account,
                config_path.display()
            );
        }

        let flow = OAuthFlow::new(account_config)?;
        let request = flow.authorize_url();

        info!(account = %self.account, "Starting authorization");

        if matches!(format, OutputFormat::Json) {
            formatter.print_json(&serde_json::json!({
                "account": self.account.as_str(),
                "authorize_url": request.url,
            }));
        } else {
            formatter.info(&format!(
                "Open this URL in a browser and sign in with the {} account:",
                self.account
            ));
            formatter.info("");
            formatter.info(&request.url);
            formatter.info("");
            formatter.info("Then paste the URL you were redirected to (or just the code):");
        }

        let mut stdin = BufReader::new(tokio::io::stdin());
        let code = read_code(&mut stdin).await?;

        let tokens = flow.exchange_code(code, request.pkce_verifier).await?;

        let store = TokenStore::default_location()?;
        store.save(self.account, &tokens)?;

        formatter.success(&format!("Authorized the {} account", self.account));
        formatter.info(&format!(
            "Tokens saved to {}",
            store.path_for(self.account).display()
        ));
        Ok(())
    }
}

/// Reads one line and extracts the authorization code from it
async fn read_code<R>(input: &mut R) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    input
        .read_line(&mut line)
        .await
        .context("Failed to read from stdin")?;
    parse_authorization_code(&line).context("No authorization code found in the pasted text")
}
