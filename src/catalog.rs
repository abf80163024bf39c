//! The register catalog: the table of named points exposed by the heat pump.
//!
//! A [`Catalog`] is validated once when it is built and never mutated
//! afterwards. Every other component trusts its addresses, decode rules and
//! writability flags, so a catalog that fails validation is a packaging defect
//! and must stop the process at startup.

use crate::protocol as proto;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Language used when a label is missing in the requested language.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Errors found while validating a catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Duplicate register address {address} used by '{first}' and '{second}'")]
    DuplicateAddress {
        address: u16,
        first: String,
        second: String,
    },

    #[error("Duplicate point name '{0}'")]
    DuplicateName(String),

    #[error("Point '{name}' has malformed bounds (min {min}, max {max}, step {step})")]
    InvalidBounds {
        name: String,
        min: f64,
        max: f64,
        step: f64,
    },

    #[error("Point '{0}' has a zero scale")]
    ZeroScale(String),

    #[error("Point '{name}' has bounds that cannot be encoded: {source}")]
    UnencodableBounds {
        name: String,
        source: proto::Error,
    },

    #[cfg(feature = "serde")]
    #[error("Cannot parse catalog: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Decode/encode rule of a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum PointKind {
    /// A plain scaled value: temperature, setpoint or percentage.
    ContinuousValue,
    /// A level that also carries an on/off state (`raw > 0`).
    OnOffDimmer,
}

impl fmt::Display for PointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointKind::ContinuousValue => write!(f, "continuous-value"),
            PointKind::OnOffDimmer => write!(f, "on-off-dimmer"),
        }
    }
}

/// Accepted range of a writable point, in display units.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64, step: f64) -> Self {
        Self { min, max, step }
    }

    fn is_well_formed(&self) -> bool {
        self.min.is_finite()
            && self.max.is_finite()
            && self.step.is_finite()
            && self.min <= self.max
            && self.step > 0.0
    }

    /// Clamps `value` into `min..=max`.
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

#[cfg(feature = "serde")]
fn default_scale() -> u16 {
    proto::DEFAULT_SCALE
}

/// One named holding register of the device.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PointDefinition {
    pub name: String,
    pub address: u16,
    pub kind: PointKind,
    #[cfg_attr(feature = "serde", serde(default))]
    pub writable: bool,
    #[cfg_attr(feature = "serde", serde(default = "default_scale"))]
    pub scale: u16,
    #[cfg_attr(feature = "serde", serde(default))]
    pub signed: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub bounds: Option<Bounds>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub unit: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub display: BTreeMap<String, String>,
}

impl PointDefinition {
    /// A read-only, unsigned continuous value scaled by 10.
    pub fn continuous(name: &str, address: u16) -> Self {
        Self {
            name: name.to_string(),
            address,
            kind: PointKind::ContinuousValue,
            writable: false,
            scale: proto::DEFAULT_SCALE,
            signed: false,
            bounds: None,
            unit: None,
            display: BTreeMap::new(),
        }
    }

    /// A read-only, unsigned dimmer scaled by 10.
    pub fn dimmer(name: &str, address: u16) -> Self {
        Self {
            kind: PointKind::OnOffDimmer,
            ..Self::continuous(name, address)
        }
    }

    pub fn writable(mut self) -> Self {
        self.writable = true;
        self
    }

    pub fn signed(mut self) -> Self {
        self.signed = true;
        self
    }

    pub fn scale(mut self, scale: u16) -> Self {
        self.scale = scale;
        self
    }

    pub fn bounds(mut self, min: f64, max: f64, step: f64) -> Self {
        self.bounds = Some(Bounds::new(min, max, step));
        self
    }

    pub fn unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn label(mut self, lang: &str, label: &str) -> Self {
        self.display.insert(lang.to_string(), label.to_string());
        self
    }

    /// The label in `lang`, falling back to [`DEFAULT_LANGUAGE`] and then to
    /// the point name.
    pub fn display_name(&self, lang: &str) -> &str {
        self.display
            .get(lang)
            .or_else(|| self.display.get(DEFAULT_LANGUAGE))
            .map(String::as_str)
            .unwrap_or(&self.name)
    }

    /// Decodes a raw register with this point's rule.
    pub fn decode(&self, raw: u16) -> f64 {
        proto::decode_display_value(raw, self.signed, self.scale)
    }

    /// Encodes a display value with this point's rule, without clamping.
    pub fn encode(&self, value: f64) -> Result<u16, proto::Error> {
        proto::encode_display_value(value, self.signed, self.scale)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if self.scale == 0 {
            return Err(CatalogError::ZeroScale(self.name.clone()));
        }
        if let Some(bounds) = &self.bounds {
            if !bounds.is_well_formed() {
                return Err(CatalogError::InvalidBounds {
                    name: self.name.clone(),
                    min: bounds.min,
                    max: bounds.max,
                    step: bounds.step,
                });
            }
            // Clamped values must always fit the register.
            for limit in [bounds.min, bounds.max] {
                self.encode(limit)
                    .map_err(|source| CatalogError::UnencodableBounds {
                        name: self.name.clone(),
                        source,
                    })?;
            }
        }
        Ok(())
    }
}

/// Validated, ordered, immutable set of point definitions.
#[derive(Debug, Clone)]
pub struct Catalog {
    points: Vec<PointDefinition>,
    by_name: HashMap<String, usize>,
    by_address: HashMap<u16, usize>,
}

impl Catalog {
    /// Builds a catalog, rejecting duplicate names or addresses and malformed
    /// entries.
    pub fn new(points: Vec<PointDefinition>) -> Result<Self, CatalogError> {
        let mut by_name = HashMap::with_capacity(points.len());
        let mut by_address: HashMap<u16, usize> = HashMap::with_capacity(points.len());
        for (index, point) in points.iter().enumerate() {
            point.validate()?;
            if by_name.insert(point.name.clone(), index).is_some() {
                return Err(CatalogError::DuplicateName(point.name.clone()));
            }
            if let Some(first) = by_address.insert(point.address, index) {
                return Err(CatalogError::DuplicateAddress {
                    address: point.address,
                    first: points[first].name.clone(),
                    second: point.name.clone(),
                });
            }
        }
        Ok(Self {
            points,
            by_name,
            by_address,
        })
    }

    /// Parses a YAML list of point definitions and validates it.
    #[cfg(feature = "serde")]
    pub fn from_yaml_reader<R: std::io::Read>(reader: R) -> Result<Self, CatalogError> {
        let points: Vec<PointDefinition> = serde_yaml::from_reader(reader)?;
        Self::new(points)
    }

    /// Parses a YAML string of point definitions and validates it.
    #[cfg(feature = "serde")]
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CatalogError> {
        let points: Vec<PointDefinition> = serde_yaml::from_str(yaml)?;
        Self::new(points)
    }

    /// The register table of the Emmeti Mirai EH1018DC.
    pub fn emmeti_mirai() -> Result<Self, CatalogError> {
        Self::new(vec![
            PointDefinition::dimmer("COMPRESSOR_MAX", 16387)
                .writable()
                .bounds(0.0, 100.0, 1.0)
                .unit("%")
                .label("en", "Compressor max")
                .label("it", "Compressore max"),
            PointDefinition::continuous("COMPRESSOR_NOW", 8996)
                .unit("%")
                .label("en", "Compressor now")
                .label("it", "Compressore ora"),
            PointDefinition::continuous("SP_HOTWATER", 16398)
                .writable()
                .signed()
                .bounds(10.0, 60.0, 1.0)
                .unit("°C")
                .label("en", "SetPoint Hot Water")
                .label("it", "Termostato ACS"),
            PointDefinition::continuous("SP_HOTWATER_OUTLET", 16400)
                .writable()
                .signed()
                .bounds(10.0, 60.0, 1.0)
                .unit("°C")
                .label("en", "SetPoint Hot Water outlet")
                .label("it", "Termostato uscita per ACS"),
            PointDefinition::continuous("SP_WINTER_MIN", 16420)
                .writable()
                .signed()
                .bounds(10.0, 60.0, 1.0)
                .unit("°C")
                .label("en", "Temp min outlet Winter")
                .label("it", "Temp. min uscita inverno"),
            PointDefinition::continuous("SP_WINTER_MAX", 16421)
                .writable()
                .signed()
                .bounds(20.0, 60.0, 1.0)
                .unit("°C")
                .label("en", "Temp max outlet Winter")
                .label("it", "Temp. max uscita inverno"),
            PointDefinition::continuous("SP_SUMMER_MIN", 16427)
                .writable()
                .signed()
                .bounds(6.5, 25.0, 0.5)
                .unit("°C")
                .label("en", "Temp min outlet Summer")
                .label("it", "Temp. min uscita estate"),
            PointDefinition::continuous("SP_SUMMER_MAX", 16428)
                .writable()
                .signed()
                .bounds(6.5, 25.0, 0.5)
                .unit("°C")
                .label("en", "Temp max outlet Summer")
                .label("it", "Temp. max uscita estate"),
            PointDefinition::continuous("TEMP_EXTERNAL", 8973)
                .signed()
                .unit("°C")
                .label("en", "Temp. ambient")
                .label("it", "Temp. esterna"),
            PointDefinition::continuous("TEMP_OUTLET", 8974)
                .signed()
                .unit("°C")
                .label("en", "Temp. outlet")
                .label("it", "Temp. uscita"),
        ])
    }

    /// Looks a point up by its exact name.
    pub fn by_name(&self, name: &str) -> crate::Result<&PointDefinition> {
        self.by_name
            .get(name)
            .map(|&index| &self.points[index])
            .ok_or_else(|| crate::Error::NotFound(crate::PointKey::Name(name.to_string())))
    }

    /// Looks a point up by its register address.
    pub fn by_address(&self, address: u16) -> crate::Result<&PointDefinition> {
        self.by_address
            .get(&address)
            .map(|&index| &self.points[index])
            .ok_or(crate::Error::NotFound(crate::PointKey::Address(address)))
    }

    /// Iterates the points in catalog order.
    pub fn iter(&self) -> std::slice::Iter<'_, PointDefinition> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a PointDefinition;
    type IntoIter = std::slice::Iter<'a, PointDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn builtin_catalog_is_valid() {
        let catalog = Catalog::emmeti_mirai().unwrap();
        assert_eq!(catalog.len(), 10);
        assert_eq!(catalog.iter().next().unwrap().name, "COMPRESSOR_MAX");
    }

    #[test]
    fn builtin_writability_follows_address_range() {
        let catalog = Catalog::emmeti_mirai().unwrap();
        for point in &catalog {
            assert_eq!(
                point.writable,
                point.address >= proto::WRITABLE_ADDRESS_START,
                "{}",
                point.name
            );
            assert_eq!(point.bounds.is_some(), point.writable, "{}", point.name);
        }
    }

    #[test]
    fn lookup() {
        let catalog = Catalog::emmeti_mirai().unwrap();
        assert_eq!(catalog.by_name("TEMP_OUTLET").unwrap().address, 8974);
        assert_eq!(catalog.by_address(16387).unwrap().name, "COMPRESSOR_MAX");
        assert_matches!(
            catalog.by_name("temp_outlet"),
            Err(crate::Error::NotFound(crate::PointKey::Name(..)))
        );
        assert_matches!(
            catalog.by_address(1),
            Err(crate::Error::NotFound(crate::PointKey::Address(1)))
        );
    }

    #[test]
    fn duplicate_address_is_rejected() {
        let result = Catalog::new(vec![
            PointDefinition::continuous("A", 100),
            PointDefinition::continuous("B", 100),
        ]);
        assert_matches!(
            result,
            Err(CatalogError::DuplicateAddress { address: 100, ref first, ref second })
                if first == "A" && second == "B"
        );
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let result = Catalog::new(vec![
            PointDefinition::continuous("A", 100),
            PointDefinition::continuous("A", 101),
        ]);
        assert_matches!(result, Err(CatalogError::DuplicateName(name)) if name == "A");
    }

    #[test]
    fn malformed_entries_are_rejected() {
        assert_matches!(
            Catalog::new(vec![PointDefinition::continuous("A", 1).bounds(60.0, 10.0, 1.0)]),
            Err(CatalogError::InvalidBounds { .. })
        );
        assert_matches!(
            Catalog::new(vec![PointDefinition::continuous("A", 1).bounds(0.0, 10.0, 0.0)]),
            Err(CatalogError::InvalidBounds { .. })
        );
        assert_matches!(
            Catalog::new(vec![PointDefinition::continuous("A", 1).scale(0)]),
            Err(CatalogError::ZeroScale(..))
        );
        assert_matches!(
            Catalog::new(vec![PointDefinition::continuous("A", 1).bounds(-5.0, 10.0, 1.0)]),
            Err(CatalogError::UnencodableBounds { .. })
        );
    }

    #[test]
    fn display_name_falls_back() {
        let catalog = Catalog::emmeti_mirai().unwrap();
        let point = catalog.by_name("TEMP_EXTERNAL").unwrap();
        assert_eq!(point.display_name("it"), "Temp. esterna");
        assert_eq!(point.display_name("de"), "Temp. ambient");
        assert_eq!(
            PointDefinition::continuous("RAW", 1).display_name("it"),
            "RAW"
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn yaml_catalog() {
        let catalog = Catalog::from_yaml_str(
            r#"
- name: COMPRESSOR_MAX
  address: 16387
  kind: on-off-dimmer
  writable: true
  bounds: { min: 0, max: 100, step: 1 }
  unit: "%"
  display: { en: Compressor max, it: Compressore max }
- name: TEMP_EXTERNAL
  address: 8973
  kind: continuous-value
  signed: true
"#,
        )
        .unwrap();
        let dimmer = catalog.by_name("COMPRESSOR_MAX").unwrap();
        assert_eq!(dimmer.kind, PointKind::OnOffDimmer);
        assert_eq!(dimmer.scale, 10);
        assert_eq!(dimmer.bounds, Some(Bounds::new(0.0, 100.0, 1.0)));
        let temp = catalog.by_address(8973).unwrap();
        assert!(temp.signed);
        assert!(!temp.writable);
        assert_eq!(temp.display_name("en"), "TEMP_EXTERNAL");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn yaml_catalog_is_validated() {
        let result = Catalog::from_yaml_str(
            r#"
- { name: A, address: 1, kind: continuous-value }
- { name: B, address: 1, kind: continuous-value }
"#,
        );
        assert_matches!(result, Err(CatalogError::DuplicateAddress { address: 1, .. }));
        assert_matches!(
            Catalog::from_yaml_str("- { name: A }"),
            Err(CatalogError::Yaml(..))
        );
    }
}
