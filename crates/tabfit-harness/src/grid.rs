use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tabfit_core::{TabError, TabResult};
use tabfit_model::{HyperValue, Hyperparameters};

/// Candidate values per hyperparameter, in the order the parameters were given.
///
/// In JSON this is an object mapping each name to its list of values; the
/// key order of the document is kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HyperparameterGrid {
    axes: Vec<(String, Vec<HyperValue>)>,
}

impl HyperparameterGrid {
    pub fn new() -> Self {
        HyperparameterGrid { axes: Vec::new() }
    }

    /// Add (or replace) the candidate values of `name`.
    pub fn axis<V: Into<HyperValue>>(mut self, name: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values: Vec<HyperValue> = values.into_iter().map(Into::into).collect();
        match self.axes.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = values,
            None => self.axes.push((name.to_string(), values)),
        }
        self
    }

    pub fn axes(&self) -> &[(String, Vec<HyperValue>)] {
        &self.axes
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    /// Number of combinations `cartesian` yields.
    pub fn n_combinations(&self) -> usize {
        self.axes.iter().map(|(_, v)| v.len()).product()
    }

    /// Every combination of the axes. The first axis varies slowest; an empty
    /// grid yields a single empty combination.
    pub fn cartesian(&self) -> Vec<Hyperparameters> {
        let mut combinations = vec![Hyperparameters::new()];
        for (name, values) in &self.axes {
            let mut next = Vec::with_capacity(combinations.len() * values.len());
            for combination in &combinations {
                for value in values {
                    next.push(combination.clone().with(name, value.clone()));
                }
            }
            combinations = next;
        }
        combinations
    }

    pub(crate) fn validate(&self) -> TabResult<()> {
        if let Some((name, _)) = self.axes.iter().find(|(_, v)| v.is_empty()) {
            return Err(TabError::invalid_argument(
                "hyperparameter_grid",
                format!("`{}` has no candidate values", name),
            ));
        }
        Ok(())
    }
}

impl Serialize for HyperparameterGrid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.axes.len()))?;
        for (name, values) in &self.axes {
            map.serialize_entry(name, values)?;
        }
        map.end()
    }
}

struct GridVisitor;

impl<'de> Visitor<'de> for GridVisitor {
    type Value = HyperparameterGrid;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map from hyperparameter name to a list of values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut grid = HyperparameterGrid::new();
        while let Some((name, values)) = access.next_entry::<String, Vec<HyperValue>>()? {
            grid = grid.axis(&name, values);
        }
        Ok(grid)
    }
}

impl<'de> Deserialize<'de> for HyperparameterGrid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(GridVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cartesian_first_axis_slowest() {
        let grid = HyperparameterGrid::new()
            .axis("cost", [1.0, 10.0])
            .axis("rbf_sigma", [0.1, 0.5, 1.0]);
        let combos = grid.cartesian();
        assert_eq!(combos.len(), 6);
        assert_eq!(grid.n_combinations(), 6);
        assert_eq!(combos[0].to_string(), "{cost=1, rbf_sigma=0.1}");
        assert_eq!(combos[2].to_string(), "{cost=1, rbf_sigma=1}");
        assert_eq!(combos[3].to_string(), "{cost=10, rbf_sigma=0.1}");
    }

    #[test]
    fn test_empty_grid_single_combination() {
        let combos = HyperparameterGrid::new().cartesian();
        assert_eq!(combos, vec![Hyperparameters::new()]);
    }

    #[test]
    fn test_json_keeps_key_order() {
        let grid: HyperparameterGrid =
            serde_json::from_str(r#"{"weight_func": ["rectangular", "inverse"], "neighbors": [5, 10]}"#).unwrap();
        assert_eq!(grid.axes()[0].0, "weight_func");
        assert_eq!(grid.cartesian()[1].to_string(), "{neighbors=10, weight_func=rectangular}");
        let back: HyperparameterGrid = serde_json::from_str(&serde_json::to_string(&grid).unwrap()).unwrap();
        assert_eq!(back, grid);
    }

    #[test]
    fn test_empty_axis_rejected() {
        let grid = HyperparameterGrid::new().axis::<f64>("penalty", []);
        assert!(matches!(grid.validate(), Err(TabError::InvalidArgument { .. })));
    }
}
