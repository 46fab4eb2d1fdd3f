//! Tunnel command - like `proxy`, but requires a project API key.

use anyhow::Result;

use ory_client::ApiKeyCredentials;

use super::Context;
use super::proxy::{self, ProxyArgs};

pub async fn run(args: ProxyArgs, ctx: &Context) -> Result<()> {
    proxy::serve("tunnel", args, ctx, &ApiKeyCredentials::from_env(true)).await
}
