use std::path::PathBuf;
use std::process;

use clap::Parser;

use diffmatte::{
    default_output_path, is_supported_image, process as run, AcquisitionPlan, AcquisitionRequest,
    BackgroundService, CommandService, ImageSource, MatteOptions,
};

#[derive(Parser)]
#[command(
    name = "diffmatte",
    about = "Recover a transparent cut-out from white- and black-background renderings",
    version,
    after_help = "Input resolution (first match wins):\n  \
                  --white and --black    matte the given pair directly\n  \
                  --white                service edits it onto black, then matte\n  \
                  --input and PROMPT     service isolates PROMPT onto white, edits to black\n  \
                  PROMPT                 service generates PROMPT on white, edits to black\n\n\
                  The service program is called as:\n  \
                  <service> [--service-arg ...] <operation> --instruction <text> \
                  [--input <png>] --output <png>"
)]
struct Cli {
    /// Subject description (what to generate, or what to extract from --input)
    prompt: Option<String>,

    /// Existing image to extract the subject from
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Ready-made white-background rendering
    #[arg(short, long)]
    white: Option<PathBuf>,

    /// Ready-made black-background rendering
    #[arg(short, long)]
    black: Option<PathBuf>,

    /// Output file, .png or .webp (default: {name}_matte.png)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also save the white and black renderings next to the output
    #[arg(short, long)]
    save_intermediates: bool,

    /// Program that performs image generation and editing
    #[arg(long, env = "DIFFMATTE_SERVICE")]
    service: Option<PathBuf>,

    /// Extra argument passed to the service program (repeatable)
    #[arg(long = "service-arg", allow_hyphen_values = true)]
    service_args: Vec<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose && cli.quiet {
        eprintln!("Error: Cannot specify both --verbose and --quiet");
        process::exit(1);
    }

    let level = if cli.quiet {
        tracing::Level::ERROR
    } else if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    for path in [&cli.input, &cli.white, &cli.black].into_iter().flatten() {
        if !path.exists() {
            eprintln!("Error: Input path does not exist: {}", path.display());
            process::exit(1);
        }
        if !is_supported_image(path) {
            eprintln!("Error: Unsupported input image: {}", path.display());
            process::exit(1);
        }
    }

    let request = AcquisitionRequest {
        white: cli.white.map(ImageSource::Path),
        black: cli.black.map(ImageSource::Path),
        input_image: cli.input.map(ImageSource::Path),
        prompt: cli.prompt,
    };

    let plan = AcquisitionPlan::resolve(&request);
    if matches!(plan, AcquisitionPlan::Unresolvable) {
        eprintln!("Error: Nothing to do. Give --white and --black, --white, --input with a prompt, or a prompt");
        eprintln!("Usage: diffmatte [PROMPT] [-i <img>] [-w <img>] [-b <img>] -o <out.png>");
        process::exit(1);
    }

    let service = cli
        .service
        .map(|program| CommandService::new(program).with_args(cli.service_args));
    if plan.needs_service() && service.is_none() {
        eprintln!(
            "Error: The {} path needs an image service; pass --service or set DIFFMATTE_SERVICE",
            plan.name()
        );
        process::exit(1);
    }

    let output = cli
        .output
        .unwrap_or_else(|| default_output_path(&request));
    let opts = MatteOptions {
        save_intermediates: cli.save_intermediates,
    };

    let service = service.as_ref().map(|s| s as &dyn BackgroundService);
    match run(&request, service, &output, &opts) {
        Ok(out) => {
            if !cli.quiet {
                eprintln!(
                    "[OK] {} ({}x{})",
                    out.path.display(),
                    out.dimensions.0,
                    out.dimensions.1
                );
                if let Some((white, black)) = &out.intermediates {
                    eprintln!("  -> {}", white.display());
                    eprintln!("  -> {}", black.display());
                }
            }
        }
        Err(e) => {
            eprintln!("[FAIL] {e}");
            process::exit(1);
        }
    }
}
