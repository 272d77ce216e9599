use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facetag_core::{descriptors, Config, FaceService, ImageSource, OverlayRenderer};
use facetag_hw::{Camera, CaptureAdapter, CaptureConstraints};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "facetag", about = "Label faces in images against reference photos")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build labeled descriptors from reference images
    Describe {
        /// Label for each reference image, in order
        #[arg(short, long = "label", required = true)]
        labels: Vec<String>,
        /// Reference image path or data URI, one per label
        #[arg(short, long = "image", required = true)]
        images: Vec<String>,
        /// Where to write the descriptor JSON
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Detect and label every face in an image
    Recognize {
        /// Descriptor JSON written by `describe`
        #[arg(short, long)]
        descriptors: PathBuf,
        /// Target image path or data URI
        image: String,
        /// Write a copy with boxes and labels to this file in the output directory
        #[arg(long)]
        overlay: Option<String>,
    },
    /// Take a still picture from the camera
    Capture {
        /// File name in the output directory
        #[arg(short, long, default_value = "capture.jpg")]
        out: String,
        /// Print a data URI instead of writing a file
        #[arg(long)]
        data_uri: bool,
    },
    /// List capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Describe { labels, images, out } => describe(&config, labels, images, out).await,
        Commands::Recognize {
            descriptors,
            image,
            overlay,
        } => recognize(&config, descriptors, &image, overlay),
        Commands::Capture { out, data_uri } => capture(&config, &out, data_uri),
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No capture devices found");
            }
            for dev in devices {
                println!("{}\t{}\t{} ({})", dev.path, dev.name, dev.driver, dev.bus);
            }
            Ok(())
        }
    }
}

async fn describe(config: &Config, labels: Vec<String>, images: Vec<String>, out: PathBuf) -> Result<()> {
    let sources = parse_sources(&images)?;

    let service = FaceService::from_config(config).context("loading face models")?;
    let batch = service.build_descriptors(&labels, &sources).await?;

    descriptors::save_json(&out, &batch.descriptors)
        .with_context(|| format!("writing {}", out.display()))?;
    println!("{} descriptor(s) written to {}", batch.descriptors.len(), out.display());

    for failure in &batch.failures {
        eprintln!("#{} '{}': {}", failure.index, failure.label, failure.error);
    }
    if !batch.is_complete() {
        bail!("{} of {} reference image(s) failed", batch.failures.len(), labels.len());
    }
    Ok(())
}

/// Parse every `--image` argument up front.
///
/// A malformed argument is a usage error for the whole batch, like a label
/// count mismatch, so nothing is processed until all of them parse.
fn parse_sources(images: &[String]) -> Result<Vec<ImageSource>> {
    images
        .iter()
        .enumerate()
        .map(|(index, arg)| {
            ImageSource::parse(arg).with_context(|| format!("image argument #{index} is not a valid path or data URI"))
        })
        .collect()
}

fn recognize(config: &Config, descriptors_path: PathBuf, image: &str, overlay: Option<String>) -> Result<()> {
    let references = descriptors::load_json(&descriptors_path)
        .with_context(|| format!("reading {}", descriptors_path.display()))?;
    let source = ImageSource::parse(image).context("parsing image argument")?;

    let service = FaceService::from_config(config).context("loading face models")?;
    let recognition = service.recognize(&source, &references)?;

    for (result, detection) in recognition.matches.iter().zip(&recognition.detections) {
        println!(
            "{}\t{:.4}\t[{:.0}, {:.0}, {:.0}, {:.0}]",
            result.label,
            result.distance,
            detection.bbox.x,
            detection.bbox.y,
            detection.bbox.width,
            detection.bbox.height
        );
    }
    println!("known: {}", recognition.known_labels().join(", "));

    if let Some(name) = overlay {
        let renderer = match &config.font_path {
            Some(path) => OverlayRenderer::with_font_file(path)?,
            None => OverlayRenderer::new(),
        };
        let rendered = renderer.render(&recognition.image, &recognition.matches, &recognition.detections)?;
        let path = service
            .dirs()
            .save_jpeg(&name, &rendered, config.jpeg_quality)
            .context("saving overlay")?;
        println!("overlay written to {}", path.display());
    }
    Ok(())
}

fn capture(config: &Config, out: &str, data_uri: bool) -> Result<()> {
    let mut adapter = CaptureAdapter::new(CaptureConstraints {
        device: config.camera_device.clone(),
        width: config.capture_width,
        height: config.capture_height,
        jpeg_quality: config.jpeg_quality,
        ..CaptureConstraints::default()
    });

    if !adapter.start_stream() {
        bail!("camera {} is not available", config.camera_device);
    }
    let snapshot = adapter.take_picture()?;

    if data_uri {
        println!("{}", snapshot.to_data_uri());
        return Ok(());
    }

    let path = config.output_dir.join(out);
    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating {}", config.output_dir.display()))?;
    std::fs::write(&path, &snapshot.jpeg).with_context(|| format!("writing {}", path.display()))?;
    println!("{}x{} snapshot written to {}", snapshot.width, snapshot.height, path.display());
    Ok(())
}
