mod config;
mod logging;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use export_logging::{export_info, export_warn, level_for};
use kbsync_core::{ConverterKind, ExportSettings, RunReport};
use kbsync_engine::{
    ApiCredentials, AssetPipeline, Converter, Exporter, FetchSettings, HelpdeskApi,
    Html2MdConverter, PageSettings, PandocConverter, PandocPdfRenderer, ReqwestFetcher,
    WalkerOptions,
};

use crate::config::{load_file_config, resolve, Cli};
use crate::logging::LogDestination;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::initialize(
        LogDestination::from_option(cli.log_file.as_deref()),
        level_for(cli.verbose, cli.quiet),
    );

    let file_cfg = load_file_config(cli.config.as_deref())?;
    let settings = resolve(&cli, file_cfg)
        .validated()
        .context("Invalid configuration")?;

    let report = export(&settings)?;

    export_info!("Export finished: {} articles processed", report.processed());
    if report.has_failures() {
        export_warn!("Some articles or listings failed; see the log above");
    }
    println!("{report}");
    Ok(())
}

fn select_converter(kind: ConverterKind) -> Result<Box<dyn Converter>> {
    Ok(match kind {
        ConverterKind::Builtin => Box::new(Html2MdConverter),
        ConverterKind::Pandoc => Box::new(
            PandocConverter::detect()
                .ok_or_else(|| anyhow!("Converter `pandoc` was requested but is not on PATH"))?,
        ),
    })
}

fn select_pdf_renderer(enabled: bool) -> Option<PandocPdfRenderer> {
    if !enabled {
        return None;
    }
    match PandocPdfRenderer::detect() {
        Some(renderer) => {
            export_info!("PDF output via pandoc with {}", renderer.engine().program());
            Some(renderer)
        }
        None => {
            export_warn!("PDF output disabled: pandoc or a PDF engine is not installed");
            None
        }
    }
}

fn export(settings: &ExportSettings) -> Result<RunReport> {
    let converter = select_converter(settings.converter)?;
    let pdf = select_pdf_renderer(settings.generate_pdf);

    let fetcher = ReqwestFetcher::new(
        FetchSettings::default(),
        Some(ApiCredentials {
            api_key: settings.api_key.clone(),
            host: settings.domain.clone(),
        }),
    )
    .context("Failed to build HTTP client")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    export_info!(
        "Exporting {} into {}",
        settings.domain,
        settings.output_root.display()
    );

    let report = runtime.block_on(async {
        let api = HelpdeskApi::new(
            &fetcher,
            settings.api_base(),
            PageSettings {
                per_page: settings.page_size,
                delay: settings.request_delay,
                ..PageSettings::default()
            },
        );
        let assets = AssetPipeline::new(
            &fetcher,
            Some(&settings.site_base()),
            settings.attachment_patterns.clone(),
        );
        let options = WalkerOptions {
            output_root: settings.output_root.clone(),
            published_only: settings.published_only,
            backup_on_change: settings.backup_on_change,
            article_delay: settings.request_delay,
        };

        let mut exporter = Exporter::new(api, assets, converter.as_ref(), options);
        if let Some(renderer) = pdf.as_ref() {
            exporter = exporter.with_pdf(renderer);
        }
        exporter.run().await
    })?;
    Ok(report)
}
