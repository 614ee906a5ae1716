//! Unified logging macro for the transport layer.
//!
//! `knx_log!` forwards to `log::` when the `log` feature is enabled, to
//! `defmt::` when only `defmt` is enabled, and otherwise compiles to a
//! format-checked no-op so call sites never need their own `cfg`s.
//!
//! ```rust,ignore
//! knx_log!(info, "Connection to {} open", peer);
//! knx_log!(warn, "Dropping malformed frame from {}", source);
//! ```
//!
//! Arguments must implement `Display` (and `defmt::Format` with `defmt`).

/// Unified logging macro - selects `log::`, `defmt::` or nothing based on features.
#[macro_export]
#[cfg(feature = "log")]
macro_rules! knx_log {
    (info, $($arg:tt)*) => { ::log::info!($($arg)*) };
    (debug, $($arg:tt)*) => { ::log::debug!($($arg)*) };
    (warn, $($arg:tt)*) => { ::log::warn!($($arg)*) };
    (error, $($arg:tt)*) => { ::log::error!($($arg)*) };
    (trace, $($arg:tt)*) => { ::log::trace!($($arg)*) };
}

#[macro_export]
#[cfg(all(feature = "defmt", not(feature = "log")))]
macro_rules! knx_log {
    (info, $($arg:tt)*) => { ::defmt::info!($($arg)*) };
    (debug, $($arg:tt)*) => { ::defmt::debug!($($arg)*) };
    (warn, $($arg:tt)*) => { ::defmt::warn!($($arg)*) };
    (error, $($arg:tt)*) => { ::defmt::error!($($arg)*) };
    (trace, $($arg:tt)*) => { ::defmt::trace!($($arg)*) };
}

#[macro_export]
#[cfg(not(any(feature = "log", feature = "defmt")))]
macro_rules! knx_log {
    ($level:ident, $($arg:tt)*) => {{
        let _ = ::core::format_args!($($arg)*);
    }};
}
