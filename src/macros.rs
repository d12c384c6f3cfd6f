//! Crate-private logging shims.
//!
//! Call sites log unconditionally; the `log` cargo feature decides whether
//! anything is emitted. The disabled arm still consumes the arguments so
//! feature-off builds do not trip over unused bindings.

macro_rules! info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        ::log::info!($($arg)*);
        #[cfg(not(feature = "log"))]
        let _ = ($($arg)*);
    }};
}

macro_rules! log_warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "log")]
        ::log::warn!($($arg)*);
        #[cfg(not(feature = "log"))]
        let _ = ($($arg)*);
    }};
}

pub(crate) use info;
pub(crate) use log_warn as warn;
