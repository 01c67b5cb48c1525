//! Sensitivity of a final metric to one swept parameter.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::runner::ResultRecord;

/// Statistics of the records sharing one parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityGroup {
    pub value: Value,
    pub mean: f64,
    /// Sample standard deviation; 0.0 for a single record.
    pub std: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensitivity {
    pub param: String,
    pub metric: String,
    /// One group per distinct parameter value, in first-seen order.
    pub groups: Vec<SensitivityGroup>,
    /// Spread between the largest and smallest group mean.
    pub range: f64,
    /// Pearson correlation between parameter and metric. `None` when the
    /// parameter is not numeric or either side has no variance.
    pub correlation: Option<f64>,
}

/// Group `records` by `param` and summarise `metric` per group.
///
/// Records missing either the parameter or a numeric metric are skipped;
/// returns `None` if nothing is left.
pub fn analyze_sensitivity(
    records: &[ResultRecord],
    param: &str,
    metric: &str,
) -> Option<Sensitivity> {
    let pairs: Vec<(&Value, f64)> = records
        .iter()
        .filter_map(|r| Some((r.param(param)?, r.metric(metric)?)))
        .collect();
    if pairs.is_empty() {
        return None;
    }

    let mut buckets: Vec<(&Value, Vec<f64>)> = Vec::new();
    for &(value, y) in &pairs {
        match buckets.iter_mut().find(|(v, _)| same_value(v, value)) {
            Some((_, ys)) => ys.push(y),
            None => buckets.push((value, vec![y])),
        }
    }

    let groups: Vec<SensitivityGroup> = buckets
        .into_iter()
        .map(|(value, ys)| SensitivityGroup {
            value: value.clone(),
            mean: mean_std(&ys).0,
            std: sample_std(&ys),
            count: ys.len(),
        })
        .collect();

    let means = groups.iter().map(|g| g.mean);
    let max = means.clone().fold(f64::NEG_INFINITY, f64::max);
    let min = means.fold(f64::INFINITY, f64::min);

    let correlation = pairs
        .iter()
        .map(|&(value, y)| Some((value.as_f64()?, y)))
        .collect::<Option<Vec<(f64, f64)>>>()
        .and_then(|xy| pearson(&xy));

    Some(Sensitivity {
        param: param.to_string(),
        metric: metric.to_string(),
        groups,
        range: max - min,
        correlation,
    })
}

/// Numbers compare by value, so `2` and `2.0` land in one group.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Mean and population standard deviation; both 0.0 for no values.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Sample (n - 1) standard deviation; 0.0 for fewer than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let (mean, _) = mean_std(values);
    let ss = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    (ss / (n - 1.0)).sqrt()
}

fn pearson(xy: &[(f64, f64)]) -> Option<f64> {
    let n = xy.len() as f64;
    if xy.len() < 2 {
        return None;
    }
    let mx = xy.iter().map(|(x, _)| x).sum::<f64>() / n;
    let my = xy.iter().map(|(_, y)| y).sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xy {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx).powi(2);
        syy += (y - my).powi(2);
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some(sxy / (sxx * syy).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Metrics;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn record(job: usize, param: Value, rate: f64) -> ResultRecord {
        ResultRecord {
            job,
            replication: 0,
            seed: 0,
            params: BTreeMap::from([("detection".to_string(), param)]),
            metrics: Metrics::from([("rate".to_string(), instrument::Value::F64(rate))]),
        }
    }

    #[test]
    fn test_groups_means_and_range() {
        let records = vec![
            record(0, json!(0.1), 0.8),
            record(1, json!(0.1), 0.6),
            record(2, json!(0.5), 0.2),
            record(3, json!(0.5), 0.2),
        ];
        let s = analyze_sensitivity(&records, "detection", "rate").unwrap();
        assert_eq!(s.groups.len(), 2);
        assert!((s.groups[0].mean - 0.7).abs() < 1e-12);
        assert!((s.groups[0].std - 0.02f64.sqrt()).abs() < 1e-12);
        assert_eq!(s.groups[1].std, 0.0);
        assert_eq!(s.groups[1].count, 2);
        assert!((s.range - 0.5).abs() < 1e-12);
        assert!(s.correlation.unwrap() < -0.9);
    }

    #[test]
    fn test_non_numeric_parameter_has_no_correlation() {
        let records = vec![
            record(0, json!("flat"), 0.1),
            record(1, json!("none"), 0.9),
        ];
        let s = analyze_sensitivity(&records, "detection", "rate").unwrap();
        assert_eq!(s.groups.len(), 2);
        assert_eq!(s.correlation, None);
        assert!(analyze_sensitivity(&records, "missing", "rate").is_none());
    }

    #[test]
    fn test_integer_and_float_values_share_a_group() {
        let records = vec![record(0, json!(2), 0.1), record(1, json!(2.0), 0.3)];
        let s = analyze_sensitivity(&records, "detection", "rate").unwrap();
        assert_eq!(s.groups.len(), 1);
        assert_eq!(s.groups[0].count, 2);
    }

    #[test]
    fn test_std_helpers() {
        assert_eq!(mean_std(&[]), (0.0, 0.0));
        assert_eq!(mean_std(&[1.0, 3.0]), (2.0, 1.0));
        assert_eq!(sample_std(&[5.0]), 0.0);
        assert!((sample_std(&[1.0, 3.0]) - 2.0f64.sqrt()).abs() < 1e-12);
    }
}
