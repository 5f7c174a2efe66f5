//! Surface data handler

use super::HandlerOutcome;
use crate::state::{DeviceState, MeasurementMode};
use serde_json::json;

/// Handle getSurfaceData
///
/// Builds a height grid around the last measured value. Grid density
/// follows the measurement mode.
pub fn handle_get_surface_data(state: &DeviceState) -> HandlerOutcome {
    let Some(record) = &state.last_measurement else {
        return HandlerOutcome::Rejected("No surface data available".into());
    };

    let size = match record.mode {
        MeasurementMode::Quick => 4,
        MeasurementMode::Standard => 8,
        MeasurementMode::Detailed => 16,
    };

    let points: Vec<Vec<f64>> = (0..size)
        .map(|row| {
            (0..size)
                .map(|col| {
                    let offset = ((row * size + col) % 7) as f64 - 3.0;
                    ((record.value + offset * 0.01) * 1000.0).round() / 1000.0
                })
                .collect()
        })
        .collect();

    HandlerOutcome::Completed(json!({
        "rows": size,
        "cols": size,
        "unit": "mm",
        "points": points,
        "sourceRequestId": record.request_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MeasurementRecord;
    use metrolink_shared::RequestId;

    #[test]
    fn test_surface_requires_measurement() {
        let state = DeviceState::default();
        assert_eq!(
            handle_get_surface_data(&state),
            HandlerOutcome::Rejected("No surface data available".into())
        );
    }

    #[test]
    fn test_surface_grid_shape() {
        let state = DeviceState {
            last_measurement: Some(MeasurementRecord {
                request_id: RequestId::from("20240425123045123"),
                mode: MeasurementMode::Quick,
                value: 37.2,
            }),
            ..Default::default()
        };

        let HandlerOutcome::Completed(data) = handle_get_surface_data(&state) else {
            panic!("expected surface data");
        };
        assert_eq!(data["rows"], 4);
        assert_eq!(data["points"].as_array().map(Vec::len), Some(4));
        assert_eq!(data["points"][0][3], 37.2);
        assert_eq!(data["sourceRequestId"], "20240425123045123");
    }
}
