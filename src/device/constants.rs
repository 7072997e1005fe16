/**
 * The advertised local name of the fan controller.
 */
pub const TARGET_NAME: &str = "ESPFAN";

/**
 * How long (milliseconds) a scan for the fan controller may run before it is stopped.
 */
pub const SCAN_TIMEOUT: u64 = 5000;

/**
 * The UUID of the fan controller service, as flashed by the ESPFAN firmware.
 */
pub const DEFAULT_SERVICE: &str = "f158a25a-f800-41af-9193-e80ef1a1d3e7";

/**
 * The UUID of the readable / notifiable status message characteristic.
 */
pub const DEFAULT_MESSAGE_CHARACTERISTIC: &str = "7b8d3c84-0efa-405d-9f9d-6d1b73fea6d6";

/**
 * The UUID of the readable / writable RPM characteristic. The payload is a decimal string.
 */
pub const DEFAULT_RPM_CHARACTERISTIC: &str = "dedf926b-600b-4dad-815a-1364e9dd0422";

/**
 * Name of the notification subscription on the message characteristic.
 */
pub const MESSAGE_TRANSACTION: &str = "messagetransaction";

/**
 * Appears in front of non-ascii characters (such as the degree sign) when the peripheral sends
 * utf-8 and the payload is decoded byte by byte.
 */
pub const ENCODING_ARTIFACT: char = 'Â';

pub const INITIAL_MESSAGE: &str = "Nothing Yet";

pub const RPM_MIN: u16 = 0;
pub const RPM_MAX: u16 = 1500;
pub const RPM_STEP: u16 = 50;
