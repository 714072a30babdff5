//! Oracle contract: the fixed rule set, the per-snapshot observation line,
//! and extraction of the decision object from free-form reply text.

use crate::error::OracleError;
use crate::fsm::context::SensorSnapshot;

use super::AdvisoryDecision;

/// System instructions sent with every query.
pub const SAFETY_RULES: &str = "\
You supervise a smart ironing appliance. You receive the soleplate \
temperature (C), the relative humidity (%) and whether fabric is detected \
under the iron. Keep the soleplate between 120C and 150C while fabric is \
present, and never compromise safety.

Rules, in priority order:
1. If fabric is NOT detected, relay MUST be false.
2. If temperature is above 170C, relay MUST be false and buzzer MUST be true.
3. With fabric detected:
   - below 120C: relay true (heat up);
   - above 150C: relay false (cool down);
   - between 120C and 150C: keep the current state, or false to save energy.

Answer with exactly one JSON object and nothing else:
{\"relay\": true|false, \"buzzer\": true|false, \"reason\": \"short explanation\"}";

/// The user message describing one snapshot.
pub fn observation(snapshot: &SensorSnapshot) -> String {
    format!(
        "Data: Temp={:.1}, Humidity={:.1}, FabricDetected={}.",
        snapshot.temperature, snapshot.humidity, snapshot.fabric_present
    )
}

/// Parse the decision out of `reply`.
///
/// Only the text between the first `{` and the last `}` is considered; any
/// prose or code fencing around it is ignored.  `relay` and `buzzer` must be
/// JSON booleans; `reason` is optional.
pub fn extract_decision(reply: &str) -> Result<AdvisoryDecision, OracleError> {
    let start = reply.find('{').ok_or(OracleError::NoJsonObject)?;
    let end = reply.rfind('}').ok_or(OracleError::NoJsonObject)?;
    if end < start {
        return Err(OracleError::NoJsonObject);
    }
    serde_json::from_str::<AdvisoryDecision>(&reply[start..=end])
        .map_err(|e| OracleError::Malformed(e.to_string()))
}
