//! Shared fixtures for taxitrips CLI end-to-end tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Verifone export without a header row
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
pub const REGIONS_GEOJSON: &str = r#"{
  "type": "FeatureCollection",
  "version": "2016-01",
  "features": [
    {"type": "Feature", "properties": {"OBJECTID": 1},
     "geometry": {"type": "Polygon", "coordinates": [[[-75.20, 39.90], [-75.14, 39.90], [-75.14, 39.96], [-75.20, 39.96], [-75.20, 39.90]]]}},
    {"type": "Feature", "properties": {"OBJECTID": 2},
     "geometry": {"type": "Polygon", "coordinates": [[[-75.14, 39.96], [-75.08, 39.96], [-75.08, 40.02], [-75.14, 40.02], [-75.14, 39.96]]]}}
  ]
}"#;

pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir_all(dir.path().join("verifone")).unwrap();
        fs::create_dir_all(dir.path().join("cmt")).unwrap();
        fs::write(dir.path().join("verifone/2014-10.csv"), VERIFONE_CSV).unwrap();
        fs::write(dir.path().join("cmt/2014-10.csv"), CMT_CSV).unwrap();
        fs::write(dir.path().join("regions.geojson"), REGIONS_GEOJSON).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path().join(name)
    }

    pub fn database(&self) -> PathBuf {
        self.file("taxitrips.db")
    }

    /// `taxitrips` running inside the workspace, isolated from the caller's
    /// environment and pointed at the workspace database
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("taxitrips").unwrap();
        cmd.current_dir(self.path());
        for var in [
            "TAXITRIPS_DATABASE",
            "TAXITRIPS_SCHEMA",
            "TAXITRIPS_CHUNK_SIZE",
            "TAXITRIPS_TRIPS_TABLE",
            "TAXITRIPS_FAIL_FAST",
            "TAXITRIPS_REGIONS",
            "LOG_LEVEL",
            "LOG_OUTPUT",
        ] {
            cmd.env_remove(var);
        }
        cmd.env("TAXITRIPS_DATABASE", self.database());
        cmd
    }

    /// Run `normalize` over both vendors into `name`
    pub fn normalize(&self, name: &str) -> PathBuf {
        let output = self.file(name);
        self.cmd()
            .args(["normalize", "--verifone", "verifone/*.csv", "--cmt", "cmt/*.csv", "-o"])
            .arg(&output)
            .assert()
            .success();
        output
    }
}
