//! CLI binary for edgequake-cv2profile.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, feeds document events to the pipeline and prints or
//! posts the resulting profiles.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_cv2profile::{
    ChannelPublisher, DocumentReference, PipelineConfig, ProfilePipeline, ProfilePublisher,
    WebhookPublisher,
};
use futures::stream::{self, Stream, StreamExt};
use std::io::{self, Write};
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # One document, profile printed to stdout
  cv2profile --document-id 42 --subject-id candidate-7

  # A stream of events, four at a time, profiles posted to a webhook
  cat events.jsonl | cv2profile --concurrency 4 --publish-url http://hooks.internal/profiles

EVENT FORMAT (stdin, one per line):
  {"documentId": 42, "subjectId": "candidate-7"}

ENVIRONMENT:
  OPENAI_API_KEY          Bearer token for the chat endpoint
  CV2PROFILE_*            Every flag can also be set from the environment
  RUST_LOG                Overrides -v / -q (e.g. RUST_LOG=edgequake_cv2profile=debug)
"#;

/// Extract structured candidate profiles from uploaded résumés.
#[derive(Parser, Debug)]
#[command(
    name = "cv2profile",
    version,
    about = "Extract structured candidate profiles from uploaded résumés",
    long_about = "Download résumés from a document store, extract their text, detect the \
language and ask an OpenAI-compatible chat model for a structured profile with an ATS \
assessment. Without --document-id, events are read as JSON lines from stdin.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Process a single document with this id.
    #[arg(long, requires = "subject_id")]
    document_id: Option<i64>,

    /// Subject the single document belongs to.
    #[arg(long, requires = "document_id")]
    subject_id: Option<String>,

    /// Base URL of the document store.
    #[arg(
        long,
        env = "CV2PROFILE_DOCUMENT_STORE_URL",
        default_value = "http://localhost:8080/api/documents"
    )]
    document_store_url: String,

    /// OpenAI-compatible chat-completions URL.
    #[arg(
        long,
        env = "CV2PROFILE_CHAT_ENDPOINT",
        default_value = edgequake_cv2profile::config::DEFAULT_CHAT_ENDPOINT
    )]
    chat_endpoint: String,

    /// API key for the chat endpoint.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model identifier.
    #[arg(
        long,
        env = "CV2PROFILE_MODEL",
        default_value = edgequake_cv2profile::config::DEFAULT_MODEL
    )]
    model: String,

    /// Language assumed when detection is unsure.
    #[arg(long, env = "CV2PROFILE_DEFAULT_LANGUAGE", default_value = "en")]
    default_language: String,

    /// Retries after the first model call.
    #[arg(long, env = "CV2PROFILE_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Initial backoff between model calls, in milliseconds.
    #[arg(long, env = "CV2PROFILE_RETRY_BACKOFF_MS", default_value_t = 3000)]
    retry_backoff_ms: u64,

    /// Deadline for one document, in seconds.
    #[arg(long, env = "CV2PROFILE_RUN_TIMEOUT")]
    run_timeout: Option<u64>,

    /// Documents processed at the same time when reading stdin.
    #[arg(short, long, env = "CV2PROFILE_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Concurrent CPU-bound jobs (PDF parsing, language scoring).
    #[arg(long, env = "CV2PROFILE_CPU_WORKERS", default_value_t = 4)]
    cpu_workers: usize,

    /// Logical name of the outbound channel.
    #[arg(long, env = "CV2PROFILE_CHANNEL", default_value = "cv.profile.parsed")]
    channel: String,

    /// POST profiles to this URL instead of printing them.
    #[arg(long, env = "CV2PROFILE_PUBLISH_URL")]
    publish_url: Option<String>,

    /// Pretty-print JSON output.
    #[arg(long)]
    pretty: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "CV2PROFILE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "CV2PROFILE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;

    // ── Publisher ────────────────────────────────────────────────────────
    let (publisher, printer) = match cli.publish_url {
        Some(ref url) => {
            let webhook = WebhookPublisher::new(
                url.clone(),
                config.output_channel.clone(),
                Duration::from_secs(config.download_timeout_secs),
            )
            .context("Failed to create webhook publisher")?;
            let webhook: Arc<dyn ProfilePublisher> = Arc::new(webhook);
            (webhook, None)
        }
        None => {
            let (channel, mut rx) = ChannelPublisher::new(config.output_channel.clone(), 64);
            let pretty = cli.pretty;
            let printer = tokio::spawn(async move {
                while let Some(profile) = rx.recv().await {
                    let json = if pretty {
                        serde_json::to_string_pretty(&profile)
                    } else {
                        serde_json::to_string(&profile)
                    };
                    match json {
                        Ok(line) => {
                            if writeln!(io::stdout(), "{line}").is_err() {
                                break;
                            }
                        }
                        Err(e) => error!("Failed to serialise profile: {e}"),
                    }
                }
            });
            let channel: Arc<dyn ProfilePublisher> = Arc::new(channel);
            (channel, Some(printer))
        }
    };

    let pipeline = Arc::new(
        ProfilePipeline::new(config, publisher).context("Failed to create pipeline")?,
    );
    // Single-document runs should not race the detector load.
    pipeline.wait_for_detector().await;

    // ── Run ──────────────────────────────────────────────────────────────
    let (total, failed) = match (cli.document_id, cli.subject_id.clone()) {
        (Some(document_id), Some(subject_id)) => {
            let event = DocumentReference::new(document_id, subject_id);
            match pipeline.run(&event).await {
                Ok(_) => (1, 0),
                Err(e) => {
                    error!("{e}");
                    (1, 1)
                }
            }
        }
        _ => run_stdin(Arc::clone(&pipeline), cli.concurrency).await?,
    };

    // Dropping the pipeline closes the channel so the printer drains and exits.
    drop(pipeline);
    if let Some(printer) = printer {
        printer.await.context("Output task failed")?;
    }

    if failed > 0 {
        bail!("{failed} of {total} document(s) failed");
    }
    info!("{total} document(s) processed");
    Ok(())
}

/// Read JSON-lines events from stdin and process them concurrently.
///
/// Events start as soon as their line arrives, so a live feed piped into the
/// binary is processed without waiting for end of input.
async fn run_stdin(pipeline: Arc<ProfilePipeline>, concurrency: usize) -> Result<(usize, usize)> {
    let events = event_stream(BufReader::new(tokio::io::stdin()));

    let outcomes = events
        .map(|event| {
            let pipeline = Arc::clone(&pipeline);
            async move {
                let Some(event) = event else {
                    return false;
                };
                match pipeline.run(&event).await {
                    Ok(_) => true,
                    Err(e) => {
                        error!(
                            "{e} ({})",
                            if e.is_transient() { "transient" } else { "permanent" }
                        );
                        false
                    }
                }
            }
        })
        .buffer_unordered(concurrency.max(1));
    let mut outcomes = pin!(outcomes);

    let (mut total, mut failed) = (0usize, 0usize);
    while let Some(ok) = outcomes.next().await {
        total += 1;
        if !ok {
            failed += 1;
        }
    }
    Ok((total, failed))
}

/// One item per non-blank line: the event, or `None` for a malformed line.
fn event_stream<R>(reader: R) -> impl Stream<Item = Option<DocumentReference>>
where
    R: AsyncBufRead + Unpin,
{
    stream::unfold((reader.lines(), 0usize), |(mut lines, mut line_no)| async move {
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => {
                    error!("Failed to read stdin: {e}");
                    return None;
                }
            };
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let event = match serde_json::from_str::<DocumentReference>(&line) {
                Ok(event) => Some(event),
                Err(e) => {
                    error!("Line {line_no}: not a document event: {e}");
                    None
                }
            };
            return Some((event, (lines, line_no)));
        }
    })
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .document_store_url(cli.document_store_url.clone())
        .chat_endpoint(cli.chat_endpoint.clone())
        .model(cli.model.clone())
        .default_language(cli.default_language.clone())
        .max_retries(cli.max_retries)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .run_timeout_secs(cli.run_timeout)
        .cpu_workers(cli.cpu_workers)
        .output_channel(cli.channel.clone());

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn events_are_yielded_before_end_of_input() {
        let (reader, mut writer) = tokio::io::duplex(1024);
        let events = event_stream(BufReader::new(reader));
        let mut events = pin!(events);

        writer
            .write_all(b"{\"documentId\": 42, \"subjectId\": \"candidate-7\"}\n")
            .await
            .unwrap();
        // The writer is still open: the first event must not wait for EOF.
        let first = tokio::time::timeout(Duration::from_secs(5), events.next())
            .await
            .expect("event yielded while input is still open");
        assert_eq!(first, Some(Some(DocumentReference::new(42, "candidate-7"))));

        writer.write_all(b"\n   \nnot json\n").await.unwrap();
        drop(writer);
        assert_eq!(events.next().await, Some(None));
        assert_eq!(events.next().await, None);
    }
}
