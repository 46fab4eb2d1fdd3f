//! Proxy command - runs the application and Ory on one domain.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Args, ValueEnum};
use console::{Style, style};

use ory_client::{ApiKeyCredentials, CredentialSource, FrontendClient};
use ory_proxy::config::{DEFAULT_PATH_PREFIX, DEFAULT_PORT};
use ory_proxy::{LookupFailurePolicy, ProxyConfig, ProxyOptions, ProxyServer, ProxyState};

use super::Context;
use crate::config::CliConfig;

/// Arguments shared by `ory proxy` and `ory tunnel`.
///
/// Flags override environment variables, which override the config file.
#[derive(Args, Debug, Clone)]
pub struct ProxyArgs {
    /// URL of the application to proxy, e.g. http://localhost:3000
    #[arg(value_name = "APPLICATION_URL")]
    pub application_url: String,

    /// Public URL of the proxy, without a path (default: http://localhost:<port>)
    #[arg(value_name = "PUBLISH_URL")]
    pub publish_url: Option<String>,

    /// Port to listen on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Path prefix under which Ory APIs are mounted
    #[arg(long, default_value = DEFAULT_PATH_PREFIX)]
    pub path_prefix: String,

    /// Domain to set on rewritten cookies (default: host of the publish URL)
    #[arg(long)]
    pub cookie_domain: Option<String>,

    /// Origin allowed to make credentialed cross-origin requests (repeatable)
    #[arg(long = "allowed-cors-origins", value_name = "ORIGIN")]
    pub allowed_cors_origins: Vec<String>,

    /// Where to send the browser instead of the root page after sign-in or sign-out
    #[arg(long = "default-redirect-url", value_name = "URL")]
    pub default_redirect_url: Option<String>,

    /// Development mode: cookies are issued without Secure and with SameSite=Lax
    #[arg(long)]
    pub dev: bool,

    /// Project slug to route Ory traffic to
    #[arg(long, env = "ORY_PROJECT")]
    pub project: Option<String>,

    /// Workspace the project belongs to
    #[arg(long, env = "ORY_WORKSPACE")]
    pub workspace: Option<String>,

    /// Ory API URL (overrides --project), e.g. for a self-hosted deployment
    #[arg(long, env = "ORY_SDK_URL", value_name = "URL")]
    pub sdk_url: Option<String>,

    /// Do not attach session tokens to forwarded requests
    #[arg(long)]
    pub without_jwt: bool,

    /// What to do when a session lookup fails
    #[arg(long, value_enum, default_value_t = OnLookupFailure::Forward)]
    pub on_lookup_failure: OnLookupFailure,

    /// Timeout for forwarded requests, in seconds
    #[arg(
        long,
        value_name = "SECONDS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub upstream_timeout: u64,

    /// Timeout for session lookups, in seconds
    #[arg(
        long,
        value_name = "SECONDS",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub lookup_timeout: u64,

    /// Look a signed-in session up again after this many seconds
    #[arg(
        long,
        value_name = "SECONDS",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub session_revalidate: u64,

    /// Config file with defaults (default: ~/.config/ory/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Command-line form of [`LookupFailurePolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnLookupFailure {
    /// Forward the request without a token
    Forward,
    /// Answer 503
    Reject,
}

impl From<OnLookupFailure> for LookupFailurePolicy {
    fn from(value: OnLookupFailure) -> Self {
        match value {
            OnLookupFailure::Forward => LookupFailurePolicy::ForwardAnonymous,
            OnLookupFailure::Reject => LookupFailurePolicy::Reject,
        }
    }
}

impl ProxyArgs {
    /// Merge flags with the config file defaults.
    ///
    /// The project is chosen as a unit: `--project`/`--sdk-url` (or their
    /// environment variables) replace the file's `project` and `sdk_url`
    /// together.
    pub fn to_options(&self, defaults: &CliConfig) -> ProxyOptions {
        let (project, api_url) = if self.project.is_some() || self.sdk_url.is_some() {
            (self.project.clone(), self.sdk_url.clone())
        } else {
            (defaults.project.clone(), defaults.sdk_url.clone())
        };

        ProxyOptions {
            upstream: self.application_url.clone(),
            publish_url: self.publish_url.clone(),
            port: self.port,
            path_prefix: self.path_prefix.clone(),
            cookie_domain: self.cookie_domain.clone(),
            cors_origins: self.allowed_cors_origins.clone(),
            default_redirect: self.default_redirect_url.clone(),
            dev: self.dev,
            project,
            api_url,
            lookup_failure: self.on_lookup_failure.into(),
            mint_tokens: !self.without_jwt,
            upstream_timeout: Duration::from_secs(self.upstream_timeout),
            lookup_timeout: Duration::from_secs(self.lookup_timeout),
            session_revalidate: Duration::from_secs(self.session_revalidate),
            ..ProxyOptions::default()
        }
    }
}

/// Run `ory proxy`. A project API key is used when present.
pub async fn run(args: ProxyArgs, ctx: &Context) -> Result<()> {
    serve("proxy", args, ctx, &ApiKeyCredentials::from_env(false)).await
}

/// Resolve the configuration, bind, and serve until Ctrl-C.
pub async fn serve(
    command: &'static str,
    args: ProxyArgs,
    ctx: &Context,
    source: &dyn CredentialSource,
) -> Result<()> {
    let defaults = CliConfig::load(args.config.as_deref())?;
    let workspace = args.workspace.clone().or_else(|| defaults.workspace.clone());

    let config = args
        .to_options(&defaults)
        .resolve()
        .context("Invalid proxy configuration")?;

    let credentials = source
        .acquire()
        .await
        .context("Failed to acquire project credentials")?;
    tracing::debug!(
        source = source.name(),
        api_key = credentials.api_key().is_some(),
        "Acquired credentials"
    );

    let resolver = FrontendClient::builder()
        .project(&config.project)
        .timeout(config.lookup_timeout)
        .build()
        .context("Failed to create Ory API client")?;

    let state = ProxyState::new(config, Arc::new(resolver))?.with_credentials(credentials);
    let server = ProxyServer::new(state);
    let listener = server.bind().await?;

    tracing::info!(
        command,
        project = %server.state().config.project.display_name(),
        workspace = workspace.as_deref().unwrap_or("-"),
        "Proxy ready"
    );
    if !ctx.quiet {
        print_banner(command, &server.state().config, workspace.as_deref(), ctx);
    }

    server.serve(listener, ory_proxy::shutdown_signal()).await?;
    Ok(())
}

fn print_banner(command: &str, config: &ProxyConfig, workspace: Option<&str>, ctx: &Context) {
    let dim = Style::new().dim();
    let green = Style::new().green();

    eprintln!();
    eprintln!(
        "{} {}",
        style(format!("Ory {} is running at", command)).bold(),
        green.apply_to(config.public_origin())
    );
    eprintln!("{}", dim.apply_to("─".repeat(40)));
    eprintln!();
    eprintln!("  {} {}", dim.apply_to("Application:"), config.upstream);
    eprintln!(
        "  {} {} {}",
        dim.apply_to("Ory APIs:   "),
        config.platform_base(),
        dim.apply_to(format!("-> {}", config.project.api_url))
    );
    eprintln!("  {} {}", dim.apply_to("JWKS:       "), config.jwks_url());
    if let Some(workspace) = workspace {
        eprintln!("  {} {}", dim.apply_to("Workspace:  "), workspace);
    }
    if config.dev {
        eprintln!(
            "  {} cookies are issued without Secure",
            dim.apply_to("Dev mode:   ")
        );
    }
    if ctx.verbose {
        eprintln!(
            "  {} {}",
            dim.apply_to("Sessions:   "),
            if config.mint_tokens {
                format!("JWT, on lookup failure: {}", config.lookup_failure)
            } else {
                "not forwarded".to_string()
            }
        );
    }
    eprintln!();
}
