use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use model::{PageRect, PixelSize};
use pageview::{ControlSize, DrawFrame, PageViewer, RenderHooks, ViewerConfig};
use render_protocol::{PixelFormat, RasterError};
use renderer::{DisplayList, RasterizerConfig, TiledRasterizer};
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug)]
#[command(author, version, about = "Render a sample page through the tiled viewport pipeline")]
struct Arguments {
    /// JSON file with `viewer` and `rasterizer` sections.
    #[arg(long, short = 'c', value_parser)]
    config: Option<PathBuf>,
    /// Where to write the composed viewport.
    #[arg(long, short = 'o', value_parser, default_value = "page.png")]
    output: PathBuf,
    /// Also write the whole-page fallback image.
    #[arg(long, value_parser)]
    fallback_output: Option<PathBuf>,
    /// Control width in layout units.
    #[arg(long, default_value_t = 800.0)]
    width: f64,
    /// Control height in layout units.
    #[arg(long, default_value_t = 600.0)]
    height: f64,
    /// Overrides the configured tile count.
    #[arg(long)]
    tiles: Option<usize>,
    /// Number of single zoom steps fired back to back.
    #[arg(long, default_value_t = 3)]
    zoom_steps: u32,
    /// Give up waiting for the final frame after this many seconds.
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct DemoConfig {
    viewer: ViewerConfig,
    rasterizer: RasterizerConfig,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let arguments = Arguments::parse();

    let mut config = match &arguments.config {
        Some(path) => load_config(path)?,
        None => DemoConfig::default(),
    };
    if let Some(tiles) = arguments.tiles {
        config.rasterizer.tile_count = tiles;
    }

    let rasterizer = TiledRasterizer::new(Arc::new(sample_page()), config.rasterizer.clone())
        .context("build rasterizer")?;
    let (redraw_sender, redraw_receiver) = crossbeam_channel::unbounded();
    let hooks = RenderHooks::new(move || {
        let _ = redraw_sender.send(());
    })
    .with_error(|error: &RasterError| log::warn!("render failed: {error}"));

    let mut viewer = PageViewer::new(
        Arc::new(rasterizer),
        ControlSize::new(arguments.width, arguments.height),
        config.viewer.clone(),
        hooks,
    )
    .context("start page viewer")?;

    if let Some(path) = &arguments.fallback_output {
        let image = viewer.fallback_image();
        write_png(path, image.size(), image.format(), image.pixels())?;
        log::info!("fallback written to {}", path.display());
    }

    // A burst of changes: only the last viewport is expected on screen.
    for _ in 0..arguments.zoom_steps {
        viewer.zoom_step(1.0, None).context("zoom step")?;
    }
    viewer.pan_by(40.0, 25.0).context("pan")?;
    let wanted = viewer.viewport_request();
    log::info!(
        "waiting for {}x{} of {:?} at zoom {:.3}",
        wanted.target_size.width,
        wanted.target_size.height,
        wanted.region,
        viewer.zoom()
    );

    let deadline = Instant::now() + Duration::from_secs(arguments.timeout_secs);
    loop {
        if let DrawFrame::Tiles(tiles) = viewer.draw()
            && tiles.request() == wanted
        {
            let pixels = tiles.compose().context("compose tiles")?;
            write_png(
                &arguments.output,
                wanted.target_size,
                config.viewer.pixel_format,
                &pixels,
            )?;
            break;
        }
        if let Some(error) = viewer.last_error() {
            bail!("render failed: {error}");
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            bail!(
                "no frame within {}s, progress {:.0}%",
                arguments.timeout_secs,
                viewer.progress().fraction() * 100.0
            );
        }
        // Either a redraw or a timeout means it is time to look again.
        let _ = redraw_receiver.recv_timeout(remaining.min(Duration::from_millis(200)));
    }

    log::info!("viewport written to {}", arguments.output.display());
    log::info!("{:?}", viewer.stats());
    viewer.release();
    Ok(())
}

fn load_config(path: &Path) -> Result<DemoConfig> {
    let text =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse config {}", path.display()))
}

/// A US letter page with a few overlapping blocks.
fn sample_page() -> DisplayList {
    DisplayList::new(PageRect::new(0.0, 0.0, 612.0, 792.0), [250, 250, 246, 255])
        .with_rect(PageRect::new(54.0, 54.0, 558.0, 126.0), [32, 64, 128, 255])
        .with_rect(PageRect::new(54.0, 162.0, 300.0, 450.0), [220, 90, 60, 255])
        .with_rect(PageRect::new(240.0, 300.0, 558.0, 612.0), [60, 160, 90, 255])
        .with_rect(PageRect::new(54.0, 648.0, 558.0, 738.0), [40, 40, 40, 255])
}

fn write_png(path: &Path, size: PixelSize, format: PixelFormat, pixels: &[u8]) -> Result<()> {
    let rgba = pixels
        .chunks_exact(format.bytes_per_pixel())
        .flat_map(|pixel| format.decode(pixel))
        .collect::<Vec<_>>();
    let image = image::RgbaImage::from_raw(size.width, size.height, rgba)
        .ok_or_else(|| anyhow!("frame does not match {}x{}", size.width, size.height))?;
    image
        .save(path)
        .with_context(|| format!("write {}", path.display()))
}
