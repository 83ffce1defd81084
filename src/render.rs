use crate::season::Season;
use crate::trend::TrendRaster;
use crate::units::{Quantity, TempUnit, convert};
use anyhow::{Context, Result, anyhow, bail};
use minifb::{Key, KeyRepeat, Window, WindowOptions};

const NAN_COLOR: u32 = 0x40_40_40;
/// Narrow grids are enlarged to at least this many pixels across.
const MIN_WIDTH: usize = 720;

/// A rendered season, one `0RGB` pixel per screen cell.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u32>,
    /// Value mapped to the ends of the palette, ±limit.
    pub limit: f64,
}

/// Largest finite absolute value, or `None` when nothing is finite.
pub fn symmetric_limit(values: &[f64]) -> Option<f64> {
    let max = values
        .iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v.abs(), |m| m.max(v.abs()))))?;
    Some(if max > 0.0 { max } else { 1.0 })
}

/// Red for warming, blue for cooling, white at zero.
pub fn diverging_color(value: f64, limit: f64) -> u32 {
    if !value.is_finite() || !(limit > 0.0) {
        return NAN_COLOR;
    }
    let t = (0.5 - value / (2.0 * limit)).clamp(0.0, 1.0);
    let c = colorous::RED_BLUE.eval_continuous(t);
    rgb_u32(c.r, c.g, c.b)
}

/// Colour one season of `raster`, north at the top. With `total_change`
/// slopes are multiplied by the span of years.
pub fn render_season(raster: &TrendRaster, season: Season, total_change: bool, scale: usize) -> Result<RasterImage> {
    let (n_lat, n_lon) = raster.shape();
    if n_lat == 0 || n_lon == 0 {
        bail!("Cannot plot an empty raster ({}x{}).", n_lon, n_lat);
    }
    let scale = scale.max(1);

    let factor = match (total_change, raster.first_year(), raster.last_year()) {
        (true, Some(first), Some(last)) => f64::from(last - first),
        _ => 1.0,
    };
    let values: Vec<f64> = raster.slopes(season).iter().map(|v| v * factor).collect();
    if values.len() != n_lat * n_lon {
        bail!(
            "Internal error: raster holds {} values for a {}x{} grid.",
            values.len(),
            n_lat,
            n_lon
        );
    }

    let limit = symmetric_limit(&values).ok_or_else(|| anyhow!("Raster contains no finite values."))?;

    let ascending = raster.latitudes.first() < raster.latitudes.last();
    let width = n_lon * scale;
    let height = n_lat * scale;
    let mut pixels = vec![0u32; width * height];

    for row in 0..n_lat {
        let src = if ascending { n_lat - 1 - row } else { row };
        for col in 0..n_lon {
            let pixel = diverging_color(values[src * n_lon + col], limit);
            for dy in 0..scale {
                let start = (row * scale + dy) * width + col * scale;
                pixels[start..start + scale].fill(pixel);
            }
        }
    }

    Ok(RasterImage {
        width,
        height,
        pixels,
        limit,
    })
}

fn title(season: Season, total_change: bool, raster: &TrendRaster, limit: f64) -> String {
    let span = match (raster.first_year(), raster.last_year()) {
        (Some(a), Some(b)) => format!("{}-{}", a, b),
        _ => "no years".to_string(),
    };
    let (unit_f, unit_c) = if total_change { ("°F total", "°C") } else { ("°F/yr", "°C/yr") };
    let range = match convert(limit, TempUnit::Fahrenheit, TempUnit::Celsius, Quantity::Increment) {
        Some(c) => format!("±{:.3} {}, ±{:.3} {}", limit, unit_f, c, unit_c),
        None => format!("±{:.3} {}", limit, unit_f),
    };
    format!("{} trend {} ({}) [Tab: season, Esc/Q: quit]", season.name(), span, range)
}

/// Interactive window over both seasons of a trend raster.
pub fn show_trend_raster(raster: &TrendRaster, total_change: bool) -> Result<()> {
    let (_, n_lon) = raster.shape();
    let scale = MIN_WIDTH.div_ceil(n_lon.max(1)).max(1);

    let mut season = Season::Summer;
    let mut image = render_season(raster, season, total_change, scale)?;

    let mut window = Window::new(
        &title(season, total_change, raster, image.limit),
        image.width,
        image.height,
        WindowOptions::default(),
    )
    .with_context(|| "Failed to create window (is an X server available, and is $DISPLAY set?)")?;
    window.set_target_fps(60);

    while window.is_open() {
        if window.is_key_down(Key::Escape) || window.is_key_down(Key::Q) {
            break;
        }

        if window.is_key_pressed(Key::Tab, KeyRepeat::No) {
            season = season.other();
            image = render_season(raster, season, total_change, scale)?;
            window.set_title(&title(season, total_change, raster, image.limit));
        }

        window
            .update_with_buffer(&image.pixels, image.width, image.height)
            .context("Failed to update window buffer")?;
    }

    Ok(())
}

fn rgb_u32(r: u8, g: u8, b: u8) -> u32 {
    (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
}
