//! Outbound frame construction.
//!
//! `FixMessageBuilder` renders tag-value frames with the body length and
//! checksum computed over the exact wire bytes, so everything it emits
//! parses back through [`super::message::FixMessage::parse`].

use super::message::checksum;
use super::tags;
use crate::engine::ExecutionReport;
use crate::order::{OrderStatus, Side};
use crate::utils::fix_timestamp_now;

/// Fluent builder for one outbound frame.
#[derive(Debug, Clone)]
pub struct FixMessageBuilder {
    begin_string: String,
    sender_comp_id: String,
    target_comp_id: String,
    msg_type: String,
    msg_seq_num: u32,
    sending_time: Option<String>,
    fields: Vec<(u32, String)>,
}

impl FixMessageBuilder {
    /// Start a frame between the given counterparties.
    pub fn new(sender_comp_id: &str, target_comp_id: &str) -> Self {
        Self {
            begin_string: tags::BEGIN_STRING_VALUE.to_string(),
            sender_comp_id: sender_comp_id.to_string(),
            target_comp_id: target_comp_id.to_string(),
            msg_type: String::new(),
            msg_seq_num: 1,
            sending_time: None,
            fields: Vec::new(),
        }
    }

    /// Override the protocol version string.
    pub fn begin_string(mut self, version: &str) -> Self {
        self.begin_string = version.to_string();
        self
    }

    /// Set the message type (tag 35).
    pub fn msg_type(mut self, msg_type: &str) -> Self {
        self.msg_type = msg_type.to_string();
        self
    }

    /// Set the sequence number (tag 34).
    pub fn msg_seq_num(mut self, seq: u32) -> Self {
        self.msg_seq_num = seq;
        self
    }

    /// Set an explicit sending time (tag 52). When absent, `encode` stamps
    /// the current wall-clock time.
    pub fn sending_time(mut self, time: &str) -> Self {
        self.sending_time = Some(time.to_string());
        self
    }

    /// Append a body field.
    pub fn field(mut self, tag: u32, value: &str) -> Self {
        self.fields.push((tag, value.to_string()));
        self
    }

    /// Render the frame: `8=…␁9=…␁<body>10=NNN␁`, where the body length
    /// counts the bytes between the `9=…␁` terminator and the `10=` tag,
    /// and the checksum is the mod-256 sum of every byte before `10=`.
    pub fn encode(self) -> Vec<u8> {
        let soh = tags::SOH as char;
        let sending_time = self.sending_time.unwrap_or_else(fix_timestamp_now);

        let mut body = String::new();
        body.push_str(&format!("35={}{soh}", self.msg_type));
        body.push_str(&format!("34={}{soh}", self.msg_seq_num));
        body.push_str(&format!("49={}{soh}", self.sender_comp_id));
        body.push_str(&format!("56={}{soh}", self.target_comp_id));
        body.push_str(&format!("52={sending_time}{soh}"));
        for (tag, value) in &self.fields {
            body.push_str(&format!("{tag}={value}{soh}"));
        }

        let mut out = format!(
            "8={}{soh}9={}{soh}",
            self.begin_string,
            body.len()
        )
        .into_bytes();
        out.extend_from_slice(body.as_bytes());
        let cs = checksum(&out);
        out.extend_from_slice(format!("10={cs:03}{soh}").as_bytes());
        out
    }
}

fn side_char(side: Side) -> char {
    match side {
        Side::Buy => '1',
        Side::Sell => '2',
    }
}

fn status_char(status: OrderStatus) -> char {
    match status {
        OrderStatus::Pending => '0',
        OrderStatus::PartiallyFilled => '1',
        OrderStatus::Filled => '2',
        OrderStatus::Cancelled => '4',
        OrderStatus::Rejected => '8',
    }
}

/// Render an execution report as an outbound type-`8` frame.
pub fn encode_execution_report(
    report: &ExecutionReport,
    sender_comp_id: &str,
    target_comp_id: &str,
    msg_seq_num: u32,
) -> Vec<u8> {
    let status = status_char(report.status).to_string();
    let mut builder = FixMessageBuilder::new(sender_comp_id, target_comp_id)
        .msg_type(tags::MSG_TYPE_EXECUTION_REPORT)
        .msg_seq_num(msg_seq_num)
        .field(tags::ORDER_ID, &report.order_id.to_string())
        .field(tags::EXEC_ID, &report.execution_id.to_string())
        .field(tags::EXEC_TYPE, &status)
        .field(tags::ORD_STATUS, &status)
        .field(tags::SYMBOL, report.symbol.as_str())
        .field(tags::SIDE, &side_char(report.side).to_string())
        .field(tags::ORDER_QTY, &report.original_quantity.to_string())
        .field(tags::CUM_QTY, &report.filled_quantity.to_string())
        .field(tags::LEAVES_QTY, &report.remaining_quantity.to_string())
        .field(tags::AVG_PX, &report.avg_price.to_decimal_string());
    if let Some(last) = report.fills.last() {
        builder = builder
            .field(tags::LAST_QTY, &last.quantity.to_string())
            .field(tags::LAST_PX, &last.price.to_decimal_string());
    }
    if let Some(reason) = report.reject_reason {
        builder = builder.field(tags::TEXT, &reason.to_string());
    }
    builder.encode()
}
