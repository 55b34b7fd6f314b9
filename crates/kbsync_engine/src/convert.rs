use std::path::PathBuf;

use export_logging::export_debug;

use crate::tools::find_program;

/// Markdown produced for one article plus any non-fatal conversion warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOutput {
    pub markdown: String,
    pub warnings: Vec<String>,
}

/// HTML to Markdown conversion. Never fails: problems degrade the output and
/// are reported through [`ConversionOutput::warnings`].
#[async_trait::async_trait]
pub trait Converter: Send + Sync {
    async fn to_markdown(&self, html: &str) -> ConversionOutput;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Html2MdConverter;

impl Html2MdConverter {
    fn convert(html: &str) -> String {
        normalize(&html2md::parse_html(html))
    }
}

#[async_trait::async_trait]
impl Converter for Html2MdConverter {
    async fn to_markdown(&self, html: &str) -> ConversionOutput {
        ConversionOutput {
            markdown: Self::convert(html),
            warnings: Vec::new(),
        }
    }
}

/// Converts through an external `pandoc` process, falling back to
/// [`Html2MdConverter`] for any article pandoc cannot handle.
#[derive(Debug, Clone)]
pub struct PandocConverter {
    program: PathBuf,
}

impl PandocConverter {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    /// `None` when pandoc is not installed.
    pub fn detect() -> Option<Self> {
        find_program("pandoc").map(Self::new)
    }

    async fn run(&self, html: &str) -> Result<String, String> {
        let input = tempfile::Builder::new()
            .prefix("kbsync-")
            .suffix(".html")
            .tempfile()
            .map_err(|err| format!("could not create pandoc input: {err}"))?;
        std::fs::write(input.path(), html)
            .map_err(|err| format!("could not write pandoc input: {err}"))?;

        let output = tokio::process::Command::new(&self.program)
            .arg("--from=html")
            .arg("--to=gfm")
            .arg("--wrap=none")
            .arg(input.path())
            .output()
            .await
            .map_err(|err| format!("could not start pandoc: {err}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("pandoc exited with {}: {}", output.status, stderr.trim()));
        }
        String::from_utf8(output.stdout).map_err(|err| format!("pandoc output is not UTF-8: {err}"))
    }
}

#[async_trait::async_trait]
impl Converter for PandocConverter {
    async fn to_markdown(&self, html: &str) -> ConversionOutput {
        match self.run(html).await {
            Ok(markdown) => ConversionOutput {
                markdown: normalize(&markdown),
                warnings: Vec::new(),
            },
            Err(reason) => {
                export_debug!("pandoc failed, using built-in conversion: {}", reason);
                ConversionOutput {
                    markdown: Html2MdConverter::convert(html),
                    warnings: vec![format!("{reason}; used built-in conversion instead")],
                }
            }
        }
    }
}

/// Trim trailing whitespace on every line and surrounding blank lines.
fn normalize(markdown: &str) -> String {
    let lines: Vec<&str> = markdown.lines().map(str::trim_end).collect();
    lines.join("\n").trim_matches('\n').to_string()
}
