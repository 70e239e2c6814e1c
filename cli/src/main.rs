//! cvmask CLI - resume PDF redaction tool

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use cvmask::{
    preview::preview_with_scale, ManualBox, MaskConfig, OverlapPolicy, RedactOptions,
    RedactionReport, Redactor,
};

#[derive(Parser)]
#[command(name = "cvmask")]
#[command(version)]
#[command(about = "Redact contact information from resume PDFs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect and redact emails, phone numbers and profile links
    Auto {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (defaults to <FILE>.redacted.pdf)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Scan every page instead of only the first
        #[arg(long)]
        all_pages: bool,

        /// Mask preset
        #[arg(long, value_enum, default_value = "resume")]
        preset: Preset,

        /// What happens to vector graphics under a mask
        #[arg(long, value_enum, default_value = "covered")]
        graphics: Policy,

        /// What happens to images under a mask
        #[arg(long, value_enum, default_value = "covered")]
        images: Policy,

        /// Replace the profile-link keywords (comma separated)
        #[arg(long, value_delimiter = ',', env = "CVMASK_KEYWORDS")]
        keywords: Option<Vec<String>>,

        /// Sample fill colors on one thread
        #[arg(long)]
        sequential: bool,

        /// Print the redaction report as JSON
        #[arg(long)]
        report: bool,
    },

    /// Redact boxes drawn over a page preview
    Manual {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// JSON array of boxes ({pageIndex, x, y, w, h, imageWidth}); '-' reads stdin
        #[arg(short, long, value_name = "JSON")]
        boxes: PathBuf,

        /// Output file (defaults to <FILE>.redacted.pdf)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Fill color as #RRGGBB
        #[arg(short, long, default_value = "#ffffff", env = "CVMASK_COLOR")]
        color: String,

        /// Keep boxes exactly as drawn instead of snapping to words
        #[arg(long)]
        no_snap: bool,

        /// Print the redaction report as JSON
        #[arg(long)]
        report: bool,
    },

    /// Show document information
    Info {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render a page to PNG
    Preview {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Zero-based page index
        #[arg(short, long, default_value = "0")]
        page: usize,

        /// Pixels per PDF unit
        #[arg(short, long, default_value = "2.0")]
        scale: f32,

        /// Output file (defaults to <FILE>.page<N>.png)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    /// Single-column resumes with contact icons
    Resume,
    /// Dense multi-column layouts
    Compact,
}

impl From<Preset> for MaskConfig {
    fn from(preset: Preset) -> Self {
        match preset {
            Preset::Resume => MaskConfig::resume(),
            Preset::Compact => MaskConfig::compact(),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    /// Keep everything, paint over it
    Keep,
    /// Remove items fully inside a mask
    Covered,
    /// Remove items touching a mask
    Touched,
}

impl From<Policy> for OverlapPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Keep => OverlapPolicy::Ignore,
            Policy::Covered => OverlapPolicy::RemoveIfCovered,
            Policy::Touched => OverlapPolicy::RemoveIfTouched,
        }
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Auto {
            input,
            output,
            all_pages,
            preset,
            graphics,
            images,
            keywords,
            sequential,
            report,
        } => {
            let mut options = RedactOptions::new()
                .with_mask(preset.into())
                .with_graphics_policy(graphics.into())
                .with_images_policy(images.into())
                .with_parallel(!sequential);
            if all_pages {
                options = options.all_pages();
            }
            let mut redactor = Redactor::new().with_options(options);
            if let Some(keywords) = keywords {
                redactor = redactor.with_keywords(keywords);
            }
            cmd_auto(&input, output.as_deref(), &redactor, report)
        }
        Commands::Manual {
            input,
            boxes,
            output,
            color,
            no_snap,
            report,
        } => cmd_manual(&input, &boxes, output.as_deref(), &color, !no_snap, report),
        Commands::Info { input, json } => cmd_info(&input, json),
        Commands::Preview {
            input,
            page,
            scale,
            output,
        } => cmd_preview(&input, page, scale, output.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn default_output(input: &Path, suffix: &str) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    input.with_file_name(format!("{}.{}", stem, suffix))
}

fn spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn cmd_auto(
    input: &Path,
    output: Option<&Path>,
    redactor: &Redactor,
    print_report: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output(input, "redacted.pdf"));

    let pb = spinner("Redacting...");
    let result = redactor.auto(&data);
    pb.finish_and_clear();
    let result = result?;

    result.save(&output)?;
    print_summary(result.report(), &output, print_report)
}

fn cmd_manual(
    input: &Path,
    boxes: &Path,
    output: Option<&Path>,
    color: &str,
    snapping: bool,
    print_report: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;
    let json = if boxes == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(boxes)?
    };
    let boxes: Vec<ManualBox> = serde_json::from_str(&json)?;
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output(input, "redacted.pdf"));

    let pb = spinner("Redacting...");
    let result = Redactor::new()
        .with_fill_hex(color)
        .with_snapping(snapping)
        .manual(&data, &boxes);
    pb.finish_and_clear();
    let result = result?;

    result.save(&output)?;
    print_summary(result.report(), &output, print_report)
}

fn print_summary(
    report: &RedactionReport,
    output: &Path,
    print_report: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if print_report {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("{}", "Redaction Summary".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    for (kind, count) in &report.detections {
        println!("{}: {}", kind.to_string().bold(), count);
    }
    if report.keyword_hits > 0 {
        println!("{}: {}", "Keyword hits".bold(), report.keyword_hits);
    }
    println!("{}: {}", "Masks".bold(), report.mask_count());
    for skipped in &report.skipped_boxes {
        println!(
            "  {} box {} (page {}): {}",
            "skipped".yellow(),
            skipped.index,
            skipped.page_index,
            skipped.reason
        );
    }
    println!("{} {}", "Saved to".green(), output.display());
    Ok(())
}

fn cmd_info(input: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;
    let info = cvmask::get_info(&data)?;

    if json {
        println!("{}", serde_json::to_string(&info)?);
        return Ok(());
    }

    let header = cvmask::sniff_header(&data)?;
    println!("{}", "Document Information".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    println!("{}: {}", "File".bold(), input.display());
    println!("{}: PDF {}", "Format".bold(), header.version);
    println!("{}: {}", "Pages".bold(), info.page_count());
    Ok(())
}

fn cmd_preview(
    input: &Path,
    page: usize,
    scale: f32,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;
    let Some(png) = preview_with_scale(&data, page, scale)? else {
        return Err(format!("page {} not found", page).into());
    };

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output(input, &format!("page{}.png", page)));
    fs::write(&output, png)?;
    println!("{} {}", "Saved to".green(), output.display());
    Ok(())
}
