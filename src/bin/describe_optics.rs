//! Configure an instrument and print its assembled optical plane stack as JSON

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::info;
use optical_train::optics::pupil::{load_pupil, masked_rms};
use optical_train::optics::{PupilSource, WfeKind};
use optical_train::{assemble, AssemblyRequest, CalcOptions, Family, GeometryCache, Instrument};

#[derive(Parser, Debug)]
#[command(author, version, about = "Print the optical plane stack for an instrument configuration")]
struct Args {
    /// Instrument family (NIRCam, MIRI, NIRSpec, NIRISS, FGS)
    #[arg(long, default_value = "NIRCam")]
    instrument: Family,

    #[arg(long)]
    filter: Option<String>,

    #[arg(long)]
    image_mask: Option<String>,

    #[arg(long)]
    pupil_mask: Option<String>,

    #[arg(long)]
    detector: Option<String>,

    /// Observing mode, for families that have several
    #[arg(long)]
    mode: Option<String>,

    /// IFU band (MIRI channel+subband or NIRSpec grating/filter)
    #[arg(long)]
    band: Option<String>,

    /// Aperture whose reference position becomes the field point
    #[arg(long)]
    aperture: Option<String>,

    /// Detector pixel position as x,y
    #[arg(long, value_delimiter = ',', num_args = 2)]
    position: Option<Vec<u32>>,

    /// Field of view in arcsec
    #[arg(long)]
    fov_arcsec: Option<f64>,

    #[arg(long, default_value_t = 2)]
    oversample: u32,

    /// Defocus in waves at 2 microns
    #[arg(long)]
    defocus_waves: Option<f64>,

    /// Leave out the field-dependent instrument WFE
    #[arg(long, default_value_t = false)]
    no_si_wfe: bool,

    /// JSON file of calculation options
    #[arg(long)]
    options: Option<PathBuf>,

    /// Directory of per-instrument JSON geometry tables
    #[arg(long)]
    geometry_dir: Option<PathBuf>,

    /// FITS map of primary mirror segment numbers
    #[arg(long, requires = "segment")]
    segment_map: Option<PathBuf>,

    /// Simulate only this segment (e.g. B3, 11 or SM)
    #[arg(long, requires = "segment_map")]
    segment: Option<String>,

    /// Also report the RMS of these WFE components (si, ote, total)
    #[arg(long, value_delimiter = ',')]
    wfe: Vec<WfeKind>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut instrument = match &args.geometry_dir {
        Some(dir) => {
            let cache = Arc::new(GeometryCache::from_json_dir(dir));
            Instrument::with_cache(args.instrument, cache)?
        }
        None => Instrument::new(args.instrument)?,
    };

    if let Some(path) = &args.options {
        let options: CalcOptions = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        instrument.set_options(options);
    }
    if let Some(mode) = &args.mode {
        instrument.set_mode(mode)?;
    }
    if let Some(detector) = &args.detector {
        instrument.set_detector(detector)?;
    }
    if let Some(filter) = &args.filter {
        instrument.set_filter(filter)?;
    }
    if let Some(mask) = &args.image_mask {
        instrument.set_image_mask(mask)?;
    }
    if let Some(mask) = &args.pupil_mask {
        instrument.set_pupil_mask(mask)?;
    }
    if let Some(band) = &args.band {
        instrument.set_band(band)?;
    }
    if let Some(aperture) = &args.aperture {
        instrument.set_position_from_aperture_name(aperture)?;
    }
    if let Some(position) = &args.position {
        instrument.set_detector_position(position[0], position[1])?;
    }
    if let Some(waves) = args.defocus_waves {
        instrument.options_mut().defocus_waves = Some(waves);
    }
    if args.no_si_wfe {
        instrument.set_include_si_wfe(false);
    }
    if let (Some(map), Some(segment)) = (&args.segment_map, &args.segment) {
        instrument.set_pupil(PupilSource::one_segment(PupilSource::File(map.clone()), segment)?);
    }

    let request = AssemblyRequest {
        fft_oversample: args.oversample,
        fov_arcsec: args.fov_arcsec,
        ..AssemblyRequest::default()
    };
    let (stack, metadata) = assemble(&instrument, &request)?;
    info!("{} planes for {}", stack.len(), instrument.config().aperture());

    let pupil = load_pupil(&instrument.config().pupil)?;
    let mut wfe_rms = serde_json::Map::new();
    for kind in &args.wfe {
        let rms_nm = masked_rms(&instrument.wfe(*kind)?, &pupil.amplitude) * 1e9;
        info!("{kind} WFE {rms_nm:.2} nm RMS");
        wfe_rms.insert(kind.to_string(), rms_nm.into());
    }

    let cfg = instrument.config();
    let report = serde_json::json!({
        "instrument": instrument.family().name(),
        "filter": cfg.filter,
        "image_mask": cfg.image_mask,
        "pupil_mask": cfg.pupil_mask,
        "detector": cfg.detector,
        "aperture": cfg.aperture(),
        "detector_position": cfg.detector_position,
        "pixel_scale": cfg.pixel_scale,
        "mode": cfg.mode,
        "band": cfg.band,
        "planes": stack,
        "metadata": metadata,
        "wfe_rms_nm": wfe_rms,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
