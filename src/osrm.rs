//! OSRM HTTP distance oracle.
//!
//! Speaks the `table` and `route` services of a running OSRM instance,
//! with costs taken from the `distance` annotation (meters). Transport
//! failures, non-2xx statuses, and missing payloads all surface as
//! [`OracleError`] so callers can tell an unreachable service apart from
//! a legitimate zero distance.

use serde::Deserialize;

use crate::distance::{DistanceMatrix, DistanceOracle};
use crate::error::OracleError;
use crate::types::Point;

#[derive(Debug, Clone)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_secs: u64,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "driving".to_string(),
            timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsrmOracle {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
}

impl OsrmOracle {
    pub fn new(config: OsrmConfig) -> Result<Self, OracleError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// OSRM coordinate path: `lng,lat` pairs joined by `;`.
    fn coords(points: &[Point]) -> String {
        points
            .iter()
            .map(|p| format!("{},{}", p.lng, p.lat))
            .collect::<Vec<_>>()
            .join(";")
    }

    fn fetch<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, OracleError> {
        let response = self.client.get(url).send()?.error_for_status()?;
        Ok(response.json::<T>()?)
    }
}

impl DistanceOracle for OsrmOracle {
    fn matrix(&self, points: &[Point]) -> Result<DistanceMatrix, OracleError> {
        if points.len() < 2 {
            return Ok(DistanceMatrix::zeros(points.len()));
        }

        let url = format!(
            "{}/table/v1/{}/{}?annotations=distance",
            self.config.base_url,
            self.config.profile,
            Self::coords(points)
        );

        let body: OsrmTableResponse = self.fetch(&url)?;
        let distances = body.distances.ok_or_else(|| {
            OracleError::MalformedResponse("table response carried no distances".to_string())
        })?;

        if distances.len() != points.len()
            || distances.iter().any(|row| row.len() != points.len())
        {
            return Err(OracleError::MalformedResponse(format!(
                "table response is not {0}x{0}",
                points.len()
            )));
        }

        let mut matrix = DistanceMatrix::zeros(points.len());
        for (from, row) in distances.iter().enumerate() {
            for (to, &meters) in row.iter().enumerate() {
                matrix.set(from, to, meters);
            }
        }
        Ok(matrix)
    }

    fn route_cost(&self, points: &[Point]) -> Result<f64, OracleError> {
        if points.len() < 2 {
            return Ok(0.0);
        }

        let url = format!(
            "{}/route/v1/{}/{}?annotations=distance&continue_straight=false",
            self.config.base_url,
            self.config.profile,
            Self::coords(points)
        );

        let body: OsrmRouteResponse = self.fetch(&url)?;
        body.routes
            .iter()
            .map(|route| route.distance)
            .min_by(|a, b| a.total_cmp(b))
            .ok_or_else(|| {
                OracleError::MalformedResponse("route response carried no routes".to_string())
            })
    }
}

#[derive(Debug, Deserialize)]
struct OsrmTableResponse {
    distances: Option<Vec<Vec<f64>>>,
}

#[derive(Debug, Deserialize)]
struct OsrmRouteResponse {
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serves one canned HTTP response on an ephemeral localhost port and
    /// returns the base url to point the oracle at.
    fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0u8; 4096];
            let _ = stream.read(&mut request);
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
        });
        format!("http://{}", addr)
    }

    fn oracle_at(base_url: String) -> OsrmOracle {
        OsrmOracle::new(OsrmConfig {
            base_url,
            timeout_secs: 5,
            ..OsrmConfig::default()
        })
        .unwrap()
    }

    fn two_points() -> Vec<Point> {
        vec![Point::new(-43.374, -22.79), Point::new(-43.5, -23.0)]
    }

    #[test]
    fn test_coords_joins_lng_lat_pairs() {
        let points = vec![Point::new(-43.374, -22.79), Point::new(-43.5, -23.0)];
        assert_eq!(OsrmOracle::coords(&points), "-43.374,-22.79;-43.5,-23");
    }

    #[test]
    fn test_table_response_parses_distances() {
        let json = r#"{"code":"Ok","distances":[[0.0,1200.5],[1180.2,0.0]]}"#;
        let body: OsrmTableResponse = serde_json::from_str(json).unwrap();
        let distances = body.distances.unwrap();
        assert_eq!(distances[0][1], 1200.5);
        assert_eq!(distances[1][0], 1180.2);
    }

    #[test]
    fn test_table_response_without_distances_is_none() {
        let json = r#"{"code":"Ok","durations":[[0.0,10.0],[10.0,0.0]]}"#;
        let body: OsrmTableResponse = serde_json::from_str(json).unwrap();
        assert!(body.distances.is_none());
    }

    #[test]
    fn test_route_response_parses_alternatives() {
        let json = r#"{"code":"Ok","routes":[{"distance":5400.0},{"distance":5100.0}]}"#;
        let body: OsrmRouteResponse = serde_json::from_str(json).unwrap();
        let best = body
            .routes
            .iter()
            .map(|r| r.distance)
            .min_by(|a, b| a.total_cmp(b))
            .unwrap();
        assert_eq!(best, 5100.0);
    }

    #[test]
    fn test_matrix_against_a_canned_table_response() {
        let base_url = serve_once(
            "200 OK",
            r#"{"code":"Ok","distances":[[0.0,1200.5],[1180.2,0.0]]}"#,
        );
        let matrix = oracle_at(base_url).matrix(&two_points()).unwrap();

        assert_eq!(matrix.size(), 2);
        assert_eq!(matrix.get(0, 1), 1200.5);
        assert_eq!(matrix.get(1, 0), 1180.2);
        assert_eq!(matrix.get(0, 0), 0.0);
    }

    #[test]
    fn test_route_cost_against_a_canned_route_response() {
        let base_url = serve_once(
            "200 OK",
            r#"{"code":"Ok","routes":[{"distance":5400.0},{"distance":5100.0}]}"#,
        );
        let cost = oracle_at(base_url).route_cost(&two_points()).unwrap();
        assert_eq!(cost, 5100.0);
    }

    #[test]
    fn test_missing_distances_is_a_malformed_response() {
        let base_url = serve_once(
            "200 OK",
            r#"{"code":"Ok","durations":[[0.0,10.0],[10.0,0.0]]}"#,
        );
        let result = oracle_at(base_url).matrix(&two_points());
        assert!(matches!(result, Err(OracleError::MalformedResponse(_))));
    }

    #[test]
    fn test_server_error_status_propagates_as_http_error() {
        let base_url = serve_once("503 Service Unavailable", "{}");
        let result = oracle_at(base_url).matrix(&two_points());
        assert!(matches!(result, Err(OracleError::Http(_))));
    }

    #[test]
    fn test_unreachable_service_is_an_error_not_zero_distance() {
        // Nothing listens on the discard port; a real query must surface
        // the transport failure rather than a zero cost.
        let oracle = OsrmOracle::new(OsrmConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
            ..OsrmConfig::default()
        })
        .unwrap();

        assert!(matches!(oracle.matrix(&two_points()), Err(OracleError::Http(_))));
        assert!(matches!(
            oracle.route_cost(&two_points()),
            Err(OracleError::Http(_))
        ));
    }

    #[test]
    fn test_matrix_under_two_points_skips_the_network() {
        // No server is listening on this port; short point lists must not
        // even attempt a request.
        let oracle = OsrmOracle::new(OsrmConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
            ..OsrmConfig::default()
        })
        .unwrap();

        let matrix = oracle.matrix(&[Point::new(1.0, 2.0)]).unwrap();
        assert_eq!(matrix.size(), 1);
        assert_eq!(oracle.route_cost(&[Point::new(1.0, 2.0)]).unwrap(), 0.0);
    }
}
