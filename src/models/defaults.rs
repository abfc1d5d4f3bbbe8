//! Ready-made default producers for [`Field::default_with`](crate::models::Field::default_with).

use crate::models::Value;
use chrono::Utc;
use uuid::Uuid;

/// Time-ordered unique id: 15-digit millisecond timestamp, uuid hex, `000` suffix.
///
/// Ids generated later sort after earlier ones, so ordering by the key roughly
/// follows insertion order.
pub fn next_id() -> Value {
    Value::String(format!(
        "{:015}{}000",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple()
    ))
}

/// Current Unix time in seconds, with sub-second precision.
pub fn now_timestamp() -> Value {
    let now = Utc::now();
    Value::Float(now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6)
}
