//! Shared fixtures for taxitrips-engine integration tests
//!
//! Writes small vendor exports and a region collection into a temporary
//! directory so the pipeline stages can run against real files.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Verifone export without a header row (23 columns)
pub const VERIFONE_CSV: &str = "\
1,101,Acme Cab,P100,VX,C200,2014-10-03 22:05:00.000,2014-10-03 22:20:00.000,2.5,39.95,-75.16,\"1500 Market St, Philadelphia, PA 19102\",39.97,-75.12,\"900 N 5th St, Philadelphia, PA 19123\",10,0.5,2,0,1,13.5,CASH,Street
1,102,Acme Cab,P101,VX,C201,2014-10-04 08:00:00.000,2014-10-04 08:09:59.000,1.5,39.95,-75.16,\"1500 Market St, Philadelphia, PA 19102\",39.97,-75.12,\"900 N 5th St, Philadelphia, PA 19123\",7,0.5,0,0,1,8.5,CC CARD,Dispatch
";

/// CMT export with its own header row
pub const CMT_CSV: &str = "\
Operator Name,Medallion,Chauffeur #,Meter On Datetime,Meter Off Datetime,Trip Length,Pickup Latitude,Pickup Longitude,Pickup Location,Dropoff Latitude,Dropoff Longitude,Dropoff Location,Fare,Tax,Tips,Tolls,Surcharge,Trip Total,Payment Type,Street/Dispatch
Liberty Taxi,P200,C300,10/03/2014 21:00,10/03/2014 21:30,3.0,39.95,-75.16,\"20 S 15th St, Philadelphia, PA 19102\",40.5,-75.0,\"Far Away Rd, Nowhere, PA 19999\",$12.00,0.6,0,0,1,13.6,Credit Card,Dispatch
";

/// Two adjacent square regions around Center City
pub fn regions_geojson() -> String {
    let square = |id: i64, x0: f64, y0: f64| {
        serde_json::json!({
            "type": "Feature",
            "properties": { "OBJECTID": id },
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[x0, y0], [x0 + 0.06, y0], [x0 + 0.06, y0 + 0.06], [x0, y0 + 0.06], [x0, y0]]]
            }
        })
    };
    serde_json::json!({
        "type": "FeatureCollection",
        "version": "2016-01",
        "features": [square(1, -75.20, 39.90), square(2, -75.14, 39.96)]
    })
    .to_string()
}

pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir_all(dir.path().join("verifone")).unwrap();
        fs::create_dir_all(dir.path().join("cmt")).unwrap();
        fs::write(dir.path().join("verifone/2014-10.csv"), VERIFONE_CSV).unwrap();
        fs::write(dir.path().join("cmt/2014-10.csv"), CMT_CSV).unwrap();
        fs::write(dir.path().join("regions.geojson"), regions_geojson()).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn pattern(&self, vendor: &str) -> String {
        format!("{}/{vendor}/*.csv", self.path().display())
    }

    pub fn regions(&self) -> PathBuf {
        self.path().join("regions.geojson")
    }

    pub fn database(&self) -> PathBuf {
        self.path().join("db/taxitrips.db")
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
