//! Convenience macros for KNX addresses.

/// Creates an [`IndividualAddress`](crate::addressing::IndividualAddress)
/// from Area.Line.Device components.
///
/// # Syntax
///
/// ```text
/// ia!(area, line, device)
/// ```
///
/// Where:
/// - `area`: 0-15
/// - `line`: 0-15
/// - `device`: 0-255
///
/// # Examples
///
/// ```
/// use knx_transport::ia;
///
/// let coupler = ia!(1, 1, 0);
/// let device = ia!(1, 1, 5);
/// assert_eq!(device.raw(), 0x1105);
/// assert_eq!(coupler.device(), 0);
/// ```
///
/// # Compile-Time Validation
///
/// ```compile_fail
/// // Area must be 0-15
/// let addr = knx_transport::ia!(16, 0, 1);
/// ```
///
/// ```compile_fail
/// // Line must be 0-15
/// let addr = knx_transport::ia!(1, 16, 1);
/// ```
#[macro_export]
macro_rules! ia {
    ($area:literal, $line:literal, $device:literal) => {{
        const _: () = {
            if $area > 15 {
                panic!("Area must be 0-15");
            }
            if $line > 15 {
                panic!("Line must be 0-15");
            }
            if $device > 255 {
                panic!("Device must be 0-255");
            }
        };

        // AAAALLLL DDDDDDDD
        const RAW: u16 = (($area & 0x0F) << 12) | (($line & 0x0F) << 8) | ($device & 0xFF);
        $crate::addressing::IndividualAddress::from_raw(RAW)
    }};
}
