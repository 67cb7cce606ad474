//! FIX tag numbers and message-type helpers used by the session layer.

/// Field separator (start-of-header byte).
pub const SOH: u8 = 0x01;

/// Tag/value separator.
pub const EQUALS: u8 = b'=';

/// Protocol version rendered on outbound frames.
pub const BEGIN_STRING_VALUE: &str = "FIX.4.4";

/// Trailer layout is fixed: `10=NNN<SOH>`.
pub const TRAILER_LEN: usize = 7;

pub const BEGIN_STRING: u32 = 8;
pub const BODY_LENGTH: u32 = 9;
pub const CHECK_SUM: u32 = 10;
pub const CL_ORD_ID: u32 = 11;
pub const CUM_QTY: u32 = 14;
pub const EXEC_ID: u32 = 17;
pub const LAST_PX: u32 = 31;
pub const LAST_QTY: u32 = 32;
pub const MSG_SEQ_NUM: u32 = 34;
pub const MSG_TYPE: u32 = 35;
pub const ORDER_ID: u32 = 37;
pub const ORDER_QTY: u32 = 38;
pub const ORD_STATUS: u32 = 39;
pub const ORD_TYPE: u32 = 40;
pub const PRICE: u32 = 44;
pub const SENDER_COMP_ID: u32 = 49;
pub const SENDING_TIME: u32 = 52;
pub const SIDE: u32 = 54;
pub const SYMBOL: u32 = 55;
pub const TARGET_COMP_ID: u32 = 56;
pub const TEXT: u32 = 58;
pub const TIME_IN_FORCE: u32 = 59;
pub const AVG_PX: u32 = 6;
pub const EXEC_TYPE: u32 = 150;
pub const LEAVES_QTY: u32 = 151;

/// Inbound message types the venue acts on.
pub const MSG_TYPE_NEW_ORDER_SINGLE: &str = "D";
pub const MSG_TYPE_ORDER_CANCEL: &str = "F";
pub const MSG_TYPE_ORDER_REPLACE: &str = "G";
/// Outbound only.
pub const MSG_TYPE_EXECUTION_REPORT: &str = "8";

/// Session-level administrative message types.
pub fn is_admin_message(msg_type: &str) -> bool {
    matches!(msg_type, "0" | "1" | "2" | "3" | "4" | "5")
}

/// Anything that is not administrative.
pub fn is_application_message(msg_type: &str) -> bool {
    !is_admin_message(msg_type)
}

/// Order-flow messages the venue translates into commands.
pub fn is_order_message(msg_type: &str) -> bool {
    matches!(
        msg_type,
        MSG_TYPE_NEW_ORDER_SINGLE | MSG_TYPE_ORDER_CANCEL | MSG_TYPE_ORDER_REPLACE
    )
}

/// Execution reports flow outbound, never inbound.
pub fn is_execution_report(msg_type: &str) -> bool {
    msg_type == MSG_TYPE_EXECUTION_REPORT
}
