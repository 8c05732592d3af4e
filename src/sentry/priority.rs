// Alert priority: mixed > overview > local > monster

use super::types::AlertCategory;

/// Resolve the confirmed states of one cycle into at most one alert.
pub fn resolve_alert(local: bool, overview: bool, monster: bool) -> Option<AlertCategory> {
    let has_threat = local || overview;
    if has_threat && monster {
        Some(AlertCategory::Mixed)
    } else if overview {
        Some(AlertCategory::Overview)
    } else if local {
        Some(AlertCategory::Local)
    } else if monster {
        Some(AlertCategory::Monster)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_priority_table() {
        use AlertCategory::*;
        let table = [
            ((false, false, false), None),
            ((true, false, false), Some(Local)),
            ((false, true, false), Some(Overview)),
            ((true, true, false), Some(Overview)),
            ((false, false, true), Some(Monster)),
            ((true, false, true), Some(Mixed)),
            ((false, true, true), Some(Mixed)),
            ((true, true, true), Some(Mixed)),
        ];
        for ((local, overview, monster), expected) in table {
            assert_eq!(
                resolve_alert(local, overview, monster),
                expected,
                "local={local} overview={overview} monster={monster}"
            );
        }
    }
}
