//! Command execution

use crate::commands::{ConfigArgs, OutputFormat, WaitArgs};
use crate::config::{resolve_settle_config, CliConfig, Verbosity};
use crate::error::CliResult;
use crate::output::{render_report_json, render_report_text};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the stderr log subscriber; `RUST_LOG` wins over the flags
pub fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));
    // A second init in the same process keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

/// Print the effective configuration as YAML
pub fn run_config(config: &CliConfig, args: &ConfigArgs) -> CliResult<()> {
    let settle_config = resolve_settle_config(&args.settle)?;
    if !config.verbosity.is_quiet() {
        print!("{}", serde_yaml_ng::to_string(&settle_config)?);
    }
    Ok(())
}

/// Open the URL, settle it and print the report
#[cfg(feature = "browser")]
pub fn run_wait(config: &CliConfig, args: &WaitArgs) -> CliResult<()> {
    use settle::{Browser, BrowserConfig, SettlementDetector};

    let settle_config = resolve_settle_config(&args.settle)?;
    let mut browser_config = BrowserConfig::default().with_headless(!args.headed);
    if args.no_sandbox {
        browser_config = browser_config.with_no_sandbox();
    }
    if let Some(path) = &args.chromium {
        browser_config = browser_config.with_chromium_path(path);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(async {
        let browser = Browser::launch(browser_config).await?;
        let mut page = browser.new_page().await?;
        page.goto(&args.url).await?;
        tracing::info!(
            url = %args.url,
            timeout_ms = settle_config.timeout_ms,
            "waiting for page to settle"
        );
        let report = SettlementDetector::new(settle_config).run(&page).await;
        if let Err(err) = page.close().await {
            tracing::debug!(error = %err, "page close failed");
        }
        if let Err(err) = browser.close().await {
            tracing::debug!(error = %err, "browser close failed");
        }
        report
    })?;

    if !config.verbosity.is_quiet() {
        match args.format {
            OutputFormat::Text => print!("{}", render_report_text(&args.url, &report)),
            OutputFormat::Json => println!("{}", render_report_json(&args.url, &report)?),
        }
    }
    Ok(())
}

/// Open the URL, settle it and print the report
#[cfg(not(feature = "browser"))]
pub fn run_wait(_config: &CliConfig, _args: &WaitArgs) -> CliResult<()> {
    Err(crate::error::CliError::Unsupported {
        message: "browser support not compiled in. Rebuild with --features browser".to_string(),
    })
}
