//! Typed FIX 4.2 application messages.

use crate::application::MessageReject;
use crate::message::{DEFAULT_BEGIN_STRING, Message};
use crate::router::Route;
use crate::session::SessionId;
use crate::tags::{self, msg_type};

macro_rules! fix_char_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $code:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Wire representation.
            pub fn as_fix(self) -> &'static str {
                match self {
                    $(Self::$variant => $code),+
                }
            }

            /// Parse the wire representation.
            pub fn from_fix(value: &str) -> Option<Self> {
                match value {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

fix_char_enum!(
    /// ExecTransType (20).
    ExecTransType { New = "0", Cancel = "1", Correct = "2", Status = "3" }
);

fix_char_enum!(
    /// ExecType (150).
    ExecType { New = "0", PartialFill = "1", Fill = "2", Canceled = "4", Rejected = "8" }
);

fix_char_enum!(
    /// OrdStatus (39).
    OrdStatus { New = "0", PartiallyFilled = "1", Filled = "2", Canceled = "4", Rejected = "8" }
);

fix_char_enum!(
    /// Side (54).
    Side { Buy = "1", Sell = "2" }
);

/// Execution Report (35=8).
///
/// Quantities and prices go on the wire with two decimal places.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub order_id: String,
    pub exec_id: String,
    pub exec_trans_type: ExecTransType,
    pub exec_type: ExecType,
    pub ord_status: OrdStatus,
    pub symbol: String,
    pub side: Side,
    pub leaves_qty: f64,
    pub cum_qty: f64,
    pub avg_px: f64,
}

impl ExecutionReport {
    /// Build the wire message.
    pub fn to_message(&self) -> Message {
        Message::new(msg_type::EXECUTION_REPORT)
            .with_begin_string(DEFAULT_BEGIN_STRING)
            .with_field(tags::ORDER_ID, &self.order_id)
            .with_field(tags::EXEC_ID, &self.exec_id)
            .with_field(tags::EXEC_TRANS_TYPE, self.exec_trans_type.as_fix())
            .with_field(tags::EXEC_TYPE, self.exec_type.as_fix())
            .with_field(tags::ORD_STATUS, self.ord_status.as_fix())
            .with_field(tags::SYMBOL, &self.symbol)
            .with_field(tags::SIDE, self.side.as_fix())
            .with_field(tags::LEAVES_QTY, format!("{:.2}", self.leaves_qty))
            .with_field(tags::CUM_QTY, format!("{:.2}", self.cum_qty))
            .with_field(tags::AVG_PX, format!("{:.2}", self.avg_px))
    }

    /// Decode from a routed message, rejecting missing or malformed fields.
    pub fn from_message(message: &Message) -> Result<Self, MessageReject> {
        Ok(Self {
            order_id: required(message, tags::ORDER_ID)?.to_string(),
            exec_id: required(message, tags::EXEC_ID)?.to_string(),
            exec_trans_type: enumerated(message, tags::EXEC_TRANS_TYPE, ExecTransType::from_fix)?,
            exec_type: enumerated(message, tags::EXEC_TYPE, ExecType::from_fix)?,
            ord_status: enumerated(message, tags::ORD_STATUS, OrdStatus::from_fix)?,
            symbol: required(message, tags::SYMBOL)?.to_string(),
            side: enumerated(message, tags::SIDE, Side::from_fix)?,
            leaves_qty: decimal(message, tags::LEAVES_QTY)?,
            cum_qty: decimal(message, tags::CUM_QTY)?,
            avg_px: decimal(message, tags::AVG_PX)?,
        })
    }

    /// Route Execution Reports to `handler`, decoding them first.
    pub fn route<F>(handler: F) -> Route
    where
        F: Fn(ExecutionReport, &SessionId) -> Result<(), MessageReject> + Send + Sync + 'static,
    {
        Route::new(
            DEFAULT_BEGIN_STRING,
            msg_type::EXECUTION_REPORT,
            move |message, session_id| handler(ExecutionReport::from_message(message)?, session_id),
        )
    }
}

fn required(message: &Message, tag: u32) -> Result<&str, MessageReject> {
    message
        .get_field(tag)
        .ok_or_else(|| MessageReject::required_tag_missing(tag))
}

fn enumerated<T>(
    message: &Message,
    tag: u32,
    parse: fn(&str) -> Option<T>,
) -> Result<T, MessageReject> {
    parse(required(message, tag)?).ok_or_else(|| MessageReject::value_is_incorrect(tag))
}

fn decimal(message: &Message, tag: u32) -> Result<f64, MessageReject> {
    required(message, tag)?
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| MessageReject::incorrect_data_format(tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::RejectReason;
    use crate::router::MessageRouter;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    fn report() -> ExecutionReport {
        ExecutionReport {
            order_id: "ord-1".to_string(),
            exec_id: "exec-1".to_string(),
            exec_trans_type: ExecTransType::New,
            exec_type: ExecType::Fill,
            ord_status: OrdStatus::Filled,
            symbol: "RANDOM".to_string(),
            side: Side::Buy,
            leaves_qty: 0.0,
            cum_qty: 10.0,
            avg_px: 10.0,
        }
    }

    #[test]
    fn to_message_formats_decimals_with_two_places() {
        let msg = report().to_message();
        assert_eq!(msg.msg_type(), "8");
        assert_eq!(msg.get_field(tags::LEAVES_QTY), Some("0.00"));
        assert_eq!(msg.get_field(tags::CUM_QTY), Some("10.00"));
        assert_eq!(msg.get_field(tags::AVG_PX), Some("10.00"));
        assert_eq!(msg.get_field(tags::SIDE), Some("1"));
        assert_eq!(msg.get_field(tags::EXEC_TYPE), Some("2"));
    }

    #[test]
    fn decodes_what_it_encodes() {
        let wire = Message::parse(report().to_message().encode(), Instant::now()).unwrap();
        assert_eq!(ExecutionReport::from_message(&wire).unwrap(), report());
    }

    #[test]
    fn missing_field_is_required_tag_reject() {
        let stripped = Message::new("8").with_field(tags::ORDER_ID, "ord-1");
        let reject = ExecutionReport::from_message(&stripped).unwrap_err();
        assert_eq!(reject.reason, RejectReason::RequiredTagMissing);
        assert_eq!(reject.ref_tag, Some(tags::EXEC_ID));
    }

    #[test]
    fn bad_enum_value_is_incorrect_value_reject() {
        let mut msg = report().to_message();
        msg.set_field(tags::SIDE, "buy");
        let reject = ExecutionReport::from_message(&msg).unwrap_err();
        assert_eq!(reject.reason, RejectReason::ValueIsIncorrect);
        assert_eq!(reject.ref_tag, Some(tags::SIDE));
    }

    #[test]
    fn bad_decimal_is_format_reject() {
        let mut msg = report().to_message();
        msg.set_field(tags::AVG_PX, "ten");
        let reject = ExecutionReport::from_message(&msg).unwrap_err();
        assert_eq!(reject.reason, RejectReason::IncorrectDataFormat);
    }

    #[test]
    fn enum_codes_round_trip() {
        for side in [Side::Buy, Side::Sell] {
            assert_eq!(Side::from_fix(side.as_fix()), Some(side));
        }
        assert_eq!(OrdStatus::from_fix("9"), None);
    }

    #[test]
    fn typed_route_decodes_before_calling_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut router = MessageRouter::new();
        router.add_route(ExecutionReport::route(move |report, _| {
            sink.lock().unwrap().push(report.symbol);
            Ok(())
        }));

        let id = SessionId::new("FIX.4.2", "A", "B");
        router.route(&report().to_message(), &id).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["RANDOM".to_string()]);

        let broken = Message::new("8");
        assert!(router.route(&broken, &id).is_err());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
