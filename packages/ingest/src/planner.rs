//! Turns the roster into the run's fetch requests.

use weather_ingest_models::{CityConfig, FetchRequest, LogicalDate};

/// Builds one [`FetchRequest`] per city, in roster order.
#[must_use]
pub fn plan_requests(cities: &[CityConfig], logical_date: LogicalDate) -> Vec<FetchRequest> {
    cities
        .iter()
        .map(|city| FetchRequest {
            city: city.clone(),
            logical_date,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_request_per_city_in_order() {
        let date: LogicalDate = "2025-01-01".parse().unwrap();
        let cities = vec![
            CityConfig::new("CityB", 2.0, 2.0),
            CityConfig::new("CityA", 1.0, 1.0),
        ];

        let requests = plan_requests(&cities, date);

        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].city.name, "CityB");
        assert_eq!(requests[1].city.name, "CityA");
        assert!(requests.iter().all(|r| r.logical_date == date));
    }

    #[test]
    fn empty_roster_plans_nothing() {
        let date: LogicalDate = "2025-01-01".parse().unwrap();
        assert!(plan_requests(&[], date).is_empty());
    }
}
