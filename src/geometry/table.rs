use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::aperture::Aperture;
use crate::error::GeometryError;

/// Per-instrument geometry table, keyed by aperture name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryTable {
    pub instrument: String,
    /// Reference data version reported in result headers
    #[serde(default = "unknown_version")]
    pub data_version: String,
    #[serde(with = "aperture_list")]
    apertures: BTreeMap<String, Aperture>,
}

fn unknown_version() -> String {
    "unknown".to_string()
}

impl GeometryTable {
    pub fn new(
        instrument: impl Into<String>,
        data_version: impl Into<String>,
        apertures: Vec<Aperture>,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            data_version: data_version.into(),
            apertures: apertures.into_iter().map(|a| (a.name.clone(), a)).collect(),
        }
    }

    /// Look up an aperture by exact name.
    pub fn lookup(&self, name: &str) -> Result<&Aperture, GeometryError> {
        self.apertures
            .get(name)
            .ok_or_else(|| GeometryError::UnknownAperture {
                instrument: self.instrument.clone(),
                aperture: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.apertures.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.apertures.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.apertures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apertures.is_empty()
    }

    /// Geometry-derived pixel scale of an aperture, arcsec/pixel.
    pub fn pixel_scale(&self, name: &str) -> Result<f64, GeometryError> {
        Ok(self.lookup(name)?.pixel_scale())
    }

    /// Convert a science-frame pixel position to telescope (V2, V3), arcsec.
    pub fn pixel_to_telescope(
        &self,
        name: &str,
        x: f64,
        y: f64,
    ) -> Result<(f64, f64), GeometryError> {
        Ok(self.lookup(name)?.sci_to_tel(x, y))
    }

    /// Convert telescope (V2, V3) in arcsec to a science-frame pixel position.
    pub fn telescope_to_pixel(
        &self,
        name: &str,
        v2: f64,
        v3: f64,
    ) -> Result<(f64, f64), GeometryError> {
        let ap = self.lookup(name)?;
        if ap.x_sci_scale == 0.0 || ap.y_sci_scale == 0.0 {
            return Err(GeometryError::Unmappable {
                aperture: name.to_string(),
                reason: "aperture has no pixel scale".to_string(),
            });
        }
        Ok(ap.tel_to_sci(v2, v3))
    }

    pub fn from_json_str(text: &str) -> Result<Self, GeometryError> {
        serde_json::from_str(text).map_err(|e| GeometryError::Load(e.to_string()))
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, GeometryError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            GeometryError::Load(format!("{}: {e}", path.as_ref().display()))
        })?;
        Self::from_json_str(&text)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }
}

/// Tables are stored on disk as a plain list of apertures.
mod aperture_list {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::geometry::aperture::Aperture;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<String, Aperture>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        let list: Vec<&Aperture> = map.values().collect();
        list.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<BTreeMap<String, Aperture>, D::Error> {
        let list = Vec::<Aperture>::deserialize(d)?;
        Ok(list.into_iter().map(|a| (a.name.clone(), a)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::aperture::ApertureKind;

    fn small_table() -> GeometryTable {
        let ap = Aperture {
            name: "FGS1_FULL".to_string(),
            kind: ApertureKind::Plain,
            x_sci_ref: 1024.5,
            y_sci_ref: 1024.5,
            x_sci_scale: 0.069,
            y_sci_scale: 0.0689,
            v2_ref: 207.0,
            v3_ref: -697.5,
            v3_idl_yang: -1.24,
            v_idl_parity: 1.0,
            corners: [(0.0, 0.0); 4],
            distortion: None,
        };
        GeometryTable::new("FGS", "test", vec![ap])
    }

    #[test]
    fn test_unknown_aperture_error() {
        let table = small_table();
        let err = table.lookup("FGS3_FULL").unwrap_err();
        assert_eq!(
            err,
            GeometryError::UnknownAperture {
                instrument: "FGS".to_string(),
                aperture: "FGS3_FULL".to_string()
            }
        );
    }

    #[test]
    fn test_json_round_trip_preserves_apertures() {
        let table = small_table();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fgs.json");
        table.save_to_file(&path).unwrap();

        let loaded = GeometryTable::load_from_file(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.data_version, "test");
        assert_eq!(loaded.lookup("FGS1_FULL").unwrap(), table.lookup("FGS1_FULL").unwrap());
    }

    #[test]
    fn test_pixel_to_telescope_at_reference() {
        let table = small_table();
        let (v2, v3) = table.pixel_to_telescope("FGS1_FULL", 1024.5, 1024.5).unwrap();
        assert!((v2 - 207.0).abs() < 1e-12);
        assert!((v3 + 697.5).abs() < 1e-12);
    }
}
