pub mod options;
pub mod state;

pub use options::{
    BarOffset, CalcOptions, JitterSpec, OutputMode, Parity, TYPICAL_LOS_JITTER_PER_AXIS,
};
pub use state::{InstrumentConfig, ObservingMode};
