// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{collections::BTreeMap, io::SeekFrom, path::PathBuf};

use clap::{Args, Parser, Subcommand};
use grab::{Body, ClientConfig, DEFAULT_ATTEMPTS, GrabConfig};
use grab_common_telemetry::{LoggingOptions, init_global_logging};
use jiff::SignedDuration;
use snafu::{ResultExt, Whatever, whatever};
use tokio::io::AsyncWrite;
use tracing::info;

#[derive(Debug, Parser)]
#[clap(name = "grab", about = "Resumable HTTP object reader", author, version)]
struct Cli {
    /// Log filter written to stderr, e.g. `info` or `grab=debug`.
    /// Falls back to `RUST_LOG`, then `info`
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Fetch(FetchArgs),
    Info(InfoArgs),
}

#[derive(Debug, Clone, Args)]
struct RequestArgs {
    /// Object URL
    url: String,

    /// Tries per request and per read
    #[arg(long, default_value_t = DEFAULT_ATTEMPTS)]
    attempts: usize,

    /// Extra request header as `Name: value`, repeatable
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    #[arg(long, default_value = "10s")]
    read_timeout: SignedDuration,

    #[arg(long, default_value = "10s")]
    connect_timeout: SignedDuration,

    #[arg(long)]
    proxy: Option<String>,

    #[arg(long)]
    user_agent: Option<String>,

    /// Treat redirects as errors instead of following them
    #[arg(long)]
    no_redirects: bool,
}

impl RequestArgs {
    fn config(&self) -> Result<GrabConfig, Whatever> {
        let headers = self
            .headers
            .iter()
            .map(|raw| parse_header(raw))
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        let client = ClientConfig::builder()
            .read_timeout(self.read_timeout)
            .connect_timeout(self.connect_timeout)
            .maybe_proxy(self.proxy.clone())
            .maybe_user_agent(self.user_agent.clone())
            .follow_redirects(!self.no_redirects)
            .build();
        Ok(GrabConfig::builder()
            .attempts(self.attempts)
            .headers(headers)
            .client(client)
            .build())
    }

    async fn open(&self) -> Result<Body, Whatever> {
        let config = self.config()?;
        Body::open(&self.url, &config)
            .await
            .with_whatever_context(|_| format!("failed to open {}", self.url))
    }
}

fn parse_header(raw: &str) -> Result<(String, String), Whatever> {
    let Some((name, value)) = raw.split_once(':') else {
        whatever!("header {raw:?} is not in `Name: value` form");
    };
    let name = name.trim();
    if name.is_empty() {
        whatever!("header {raw:?} has an empty name");
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Copy an object to a file or to stdout, reconnecting on dropped connections.
Examples:

grab fetch https://example.com/bucket/key -o key.bin --verify

")]
struct FetchArgs {
    #[command(flatten)]
    request: RequestArgs,

    /// Output file, stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Start reading at this byte offset
    #[arg(long, default_value_t = 0)]
    offset: u64,

    /// Check the data against the ETag digest once copied
    #[arg(long)]
    verify: bool,
}

impl FetchArgs {
    async fn run(&self) -> Result<(), Whatever> {
        let mut body = self.request.open().await?;
        if self.offset > 0 {
            body.seek(SeekFrom::Start(self.offset))
                .whatever_context("seek failed")?;
        }

        let copied = match &self.output {
            Some(path) => {
                let mut file = tokio::fs::File::create(path)
                    .await
                    .with_whatever_context(|_| format!("failed to create {}", path.display()))?;
                copy(&mut body, &mut file).await?
            }
            None => copy(&mut body, &mut tokio::io::stdout()).await?,
        };

        if self.verify {
            body.verify().whatever_context("verification failed")?;
        }
        body.close().whatever_context("close failed")?;
        info!(url = %body.url(), copied, "fetch complete");
        Ok(())
    }
}

async fn copy<W>(body: &mut Body, writer: &mut W) -> Result<u64, Whatever>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    body.copy_to(writer).await.whatever_context("transfer failed")
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Print the length, ETag and final location of an object.
Examples:

grab info https://example.com/bucket/key

")]
struct InfoArgs {
    #[command(flatten)]
    request: RequestArgs,
}

impl InfoArgs {
    #[allow(clippy::print_stdout)]
    async fn run(&self) -> Result<(), Whatever> {
        let mut body = self.request.open().await?;
        println!("url:    {}", body.url());
        println!("length: {}", body.len());
        println!("etag:   {}", body.etag().unwrap_or("-"));
        body.close().whatever_context("close failed")?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Whatever> {
    let cli = Cli::parse();
    let _guards = init_global_logging(
        "grab",
        &LoggingOptions::builder().maybe_level(cli.log_level.clone()).build(),
    );
    match cli.commands {
        Commands::Fetch(args) => args.run().await,
        Commands::Info(args) => args.run().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_parsing() {
        assert_eq!(
            parse_header("x-request-payer: requester").unwrap(),
            ("x-request-payer".to_string(), "requester".to_string())
        );
        assert_eq!(
            parse_header("Authorization:Bearer a:b").unwrap(),
            ("Authorization".to_string(), "Bearer a:b".to_string())
        );
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(" : value").is_err());
    }

    #[test]
    fn args_map_onto_config() {
        let cli = Cli::parse_from([
            "grab",
            "fetch",
            "http://localhost/key",
            "--attempts",
            "2",
            "-H",
            "x-a: 1",
            "--read-timeout",
            "30s",
            "--no-redirects",
            "--offset",
            "10",
        ]);
        assert!(cli.log_level.is_none());
        let Commands::Fetch(args) = cli.commands else {
            panic!("expected fetch");
        };
        assert_eq!(args.offset, 10);
        let config = args.request.config().unwrap();
        assert_eq!(config.attempts, 2);
        assert_eq!(config.headers.get("x-a").map(String::as_str), Some("1"));
        assert_eq!(config.client.read_timeout, SignedDuration::from_secs(30));
        assert!(!config.client.follow_redirects);
    }
}
