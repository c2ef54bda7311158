use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bevy::{math::Vec3, prelude::Resource};
use serde::Deserialize;
use thiserror::Error;

use crate::{components::ActorType, math::ClampRange};

pub const BUILTIN_UNIT_CATALOG: &str = include_str!("data/unit_catalog.json");

/// Index of a ship archetype in the [`UnitCatalog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShipArchetypeId(pub usize);

/// Index of a building archetype in the [`UnitCatalog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuildingArchetypeId(pub usize);

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShipData {
    pub name: String,
    pub role: ShipRole,
    pub value: f32,
    pub max_health: f32,
    pub max_speed: f32,
    pub acceleration: f32,
    pub steering_sharpness: f32,
    pub should_avoid_target_planet: bool,
    pub planet_orbit_offset: f32,
    pub planet_avoidance_distance: f32,
    pub planet_avoidance_relative_offset: f32,
    pub max_distance_sq_for_planet_proximity_importance_scaling: f32,
    pub planet_proximity_importance_remap: ClampRange,
    pub build_probability_for_ship_type: f32,
    resources_cost: [f32; 3],
    pub build_time: f32,
}

impl Default for ShipData {
    fn default() -> Self {
        Self {
            name: String::new(),
            role: ShipRole::default(),
            value: 1.0,
            max_health: 10.0,
            max_speed: 10.0,
            acceleration: 2.0,
            steering_sharpness: 2.0,
            should_avoid_target_planet: false,
            planet_orbit_offset: 1.0,
            planet_avoidance_distance: 30.0,
            planet_avoidance_relative_offset: 1.25,
            max_distance_sq_for_planet_proximity_importance_scaling: 100.0 * 100.0,
            planet_proximity_importance_remap: ClampRange::new(0.7, 1.0),
            build_probability_for_ship_type: 1.0,
            resources_cost: [1.0; 3],
            build_time: 1.0,
        }
    }
}

impl ShipData {
    pub fn resources_cost(&self) -> Vec3 {
        Vec3::from_array(self.resources_cost)
    }

    pub fn actor_type(&self) -> ActorType {
        match self.role {
            ShipRole::Fighter(_) => ActorType::Fighter,
            ShipRole::Worker(_) => ActorType::Worker,
            ShipRole::Trader(_) => ActorType::Trader,
        }
    }

    pub fn fighter(&self) -> Option<&FighterData> {
        match &self.role {
            ShipRole::Fighter(data) => Some(data),
            _ => None,
        }
    }

    pub fn worker(&self) -> Option<&WorkerData> {
        match &self.role {
            ShipRole::Worker(data) => Some(data),
            _ => None,
        }
    }

    pub fn trader(&self) -> Option<&TraderData> {
        match &self.role {
            ShipRole::Trader(data) => Some(data),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShipRole {
    Fighter(FighterData),
    Worker(WorkerData),
    Trader(TraderData),
}

impl Default for ShipRole {
    fn default() -> Self {
        ShipRole::Fighter(FighterData::default())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FighterData {
    pub detection_range: f32,
    pub attack_range: f32,
    pub attack_delay: f32,
    pub attack_damage: f32,
    pub dot_prod_threshold_for_target_in_sights: f32,
    pub ship_detection_interval: f32,
}

impl Default for FighterData {
    fn default() -> Self {
        Self {
            detection_range: 10.0,
            attack_range: 20.0,
            attack_delay: 1.0,
            attack_damage: 1.0,
            dot_prod_threshold_for_target_in_sights: 0.5,
            ship_detection_interval: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerData {
    pub capture_range: f32,
    pub capture_speed: f32,
    pub build_range: f32,
    pub build_speed: f32,
}

impl Default for WorkerData {
    fn default() -> Self {
        Self {
            capture_range: 3.0,
            capture_speed: 1.0,
            build_range: 1.0,
            build_speed: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TraderData {
    pub resource_exchange_range: f32,
    pub resource_carry_capacity: f32,
}

impl Default for TraderData {
    fn default() -> Self {
        Self {
            resource_exchange_range: 1.0,
            resource_carry_capacity: 20.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildingData {
    pub name: String,
    pub role: BuildingRole,
    pub value: f32,
    pub max_health: f32,
    pub build_probability: f32,
    pub build_time: f32,
}

impl Default for BuildingData {
    fn default() -> Self {
        Self {
            name: String::new(),
            role: BuildingRole::Factory,
            value: 1.0,
            max_health: 50.0,
            build_probability: 1.0,
            build_time: 1.0,
        }
    }
}

impl BuildingData {
    pub fn actor_type(&self) -> ActorType {
        match self.role {
            BuildingRole::Factory => ActorType::Factory,
            BuildingRole::Turret(_) => ActorType::Turret,
            BuildingRole::Research(_) => ActorType::Research,
        }
    }

    pub fn turret(&self) -> Option<&TurretData> {
        match &self.role {
            BuildingRole::Turret(data) => Some(data),
            _ => None,
        }
    }

    pub fn research(&self) -> Option<&ResearchData> {
        match &self.role {
            BuildingRole::Research(data) => Some(data),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildingRole {
    Factory,
    Turret(TurretData),
    Research(ResearchData),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TurretData {
    pub attack_range: f32,
    pub attack_delay: f32,
    pub attack_damage: f32,
    pub ship_detection_interval: f32,
    pub resource_cost: f32,
}

impl Default for TurretData {
    fn default() -> Self {
        Self {
            attack_range: 5.0,
            attack_delay: 1.0,
            attack_damage: 1.0,
            ship_detection_interval: 1.0,
            resource_cost: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResearchData {
    resources_consumption_rate: [f32; 3],
    pub research_bonuses: ResearchBonusData,
}

impl ResearchData {
    /// Resources drained per second while researching.
    pub fn resources_consumption_rate(&self) -> Vec3 {
        Vec3::from_array(self.resources_consumption_rate)
    }
}

/// Increments a research building adds to its planet every tick.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResearchBonusData {
    pub ship_speed_multiplier: f32,
    pub ship_acceleration_multiplier: f32,
    pub ship_max_health_multiplier: f32,
    pub ship_damage_multiplier: f32,
    pub factory_build_speed_multiplier: f32,
    planet_resource_generation_rate_add: [f32; 3],
}

impl ResearchBonusData {
    pub fn planet_resource_generation_rate_add(&self) -> Vec3 {
        Vec3::from_array(self.planet_resource_generation_rate_add)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct UnitCatalogFile {
    ships: Vec<ShipData>,
    buildings: Vec<BuildingData>,
}

/// Immutable archetype tables shared by every ship and building.
#[derive(Debug, Clone, Default)]
pub struct UnitCatalog {
    ships: Vec<Arc<ShipData>>,
    buildings: Vec<Arc<BuildingData>>,
}

impl UnitCatalog {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            Self::from_json_str(BUILTIN_UNIT_CATALOG).expect("builtin unit catalog should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, UnitCatalogError> {
        let file: UnitCatalogFile = serde_json::from_str(json)?;
        Self::from_parts(file.ships, file.buildings)
    }

    pub fn from_file(path: &Path) -> Result<Self, UnitCatalogError> {
        let contents = fs::read_to_string(path).map_err(|source| UnitCatalogError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn from_parts(
        ships: Vec<ShipData>,
        buildings: Vec<BuildingData>,
    ) -> Result<Self, UnitCatalogError> {
        if ships.is_empty() {
            return Err(UnitCatalogError::Invalid(
                "catalog must define at least one ship".to_string(),
            ));
        }
        for (index, ship) in ships.iter().enumerate() {
            if ships[..index].iter().any(|other| other.name == ship.name) {
                return Err(UnitCatalogError::Invalid(format!(
                    "duplicate ship name `{}`",
                    ship.name
                )));
            }
        }
        for (index, building) in buildings.iter().enumerate() {
            if buildings[..index].iter().any(|other| other.name == building.name) {
                return Err(UnitCatalogError::Invalid(format!(
                    "duplicate building name `{}`",
                    building.name
                )));
            }
        }

        Ok(Self {
            ships: ships.into_iter().map(Arc::new).collect(),
            buildings: buildings.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn ships(&self) -> &[Arc<ShipData>] {
        &self.ships
    }

    pub fn buildings(&self) -> &[Arc<BuildingData>] {
        &self.buildings
    }

    pub fn ship(&self, id: ShipArchetypeId) -> Option<&Arc<ShipData>> {
        self.ships.get(id.0)
    }

    pub fn building(&self, id: BuildingArchetypeId) -> Option<&Arc<BuildingData>> {
        self.buildings.get(id.0)
    }

    pub fn ship_id(&self, name: &str) -> Option<ShipArchetypeId> {
        self.ships
            .iter()
            .position(|ship| ship.name == name)
            .map(ShipArchetypeId)
    }

    pub fn building_id(&self, name: &str) -> Option<BuildingArchetypeId> {
        self.buildings
            .iter()
            .position(|building| building.name == name)
            .map(BuildingArchetypeId)
    }

    /// First factory archetype in catalog order.
    pub fn factory_building(&self) -> Option<BuildingArchetypeId> {
        self.buildings
            .iter()
            .position(|building| matches!(building.role, BuildingRole::Factory))
            .map(BuildingArchetypeId)
    }

    pub fn ship_entries(&self) -> impl Iterator<Item = (ShipArchetypeId, &Arc<ShipData>)> {
        self.ships
            .iter()
            .enumerate()
            .map(|(index, ship)| (ShipArchetypeId(index), ship))
    }
}

#[derive(Debug, Error)]
pub enum UnitCatalogError {
    #[error("failed to parse unit catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read unit catalog from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid unit catalog: {0}")]
    Invalid(String),
}

/// Handle for accessing the unit catalog.
#[derive(Resource, Debug, Clone)]
pub struct UnitCatalogHandle(pub Arc<UnitCatalog>);

impl UnitCatalogHandle {
    pub fn new(catalog: Arc<UnitCatalog>) -> Self {
        Self(catalog)
    }

    pub fn get(&self) -> Arc<UnitCatalog> {
        Arc::clone(&self.0)
    }

    pub fn catalog(&self) -> &UnitCatalog {
        &self.0
    }

    pub fn replace(&mut self, catalog: Arc<UnitCatalog>) {
        self.0 = catalog;
    }
}

/// Load the unit catalog from `UNIT_CATALOG_PATH`, falling back to the
/// embedded catalog.
pub fn load_unit_catalog_from_env() -> Arc<UnitCatalog> {
    if let Some(path) = env::var("UNIT_CATALOG_PATH").ok().map(PathBuf::from) {
        match UnitCatalog::from_file(&path) {
            Ok(catalog) => {
                tracing::info!(
                    target: "galaxy_sim::config",
                    path = %path.display(),
                    ships = catalog.ships().len(),
                    buildings = catalog.buildings().len(),
                    "unit_catalog.loaded=file"
                );
                return Arc::new(catalog);
            }
            Err(err) => {
                tracing::warn!(
                    target: "galaxy_sim::config",
                    path = %path.display(),
                    error = %err,
                    "unit_catalog.load_failed"
                );
            }
        }
    }

    tracing::info!(target: "galaxy_sim::config", "unit_catalog.loaded=builtin");
    UnitCatalog::builtin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_parses() {
        let catalog = UnitCatalog::builtin();
        assert!(catalog.ship_id("fighter").is_some());
        assert!(catalog.ship_id("worker").is_some());
        assert!(catalog.ship_id("trader").is_some());
        assert!(catalog.factory_building().is_some());
        let fighter = catalog.ship(catalog.ship_id("fighter").unwrap()).unwrap();
        assert_eq!(fighter.actor_type(), ActorType::Fighter);
        assert!(fighter.fighter().is_some());
    }

    #[test]
    fn roles_are_tagged_by_kind() {
        let json = r#"{
            "ships": [
                { "name": "hauler", "role": { "kind": "trader", "resource_carry_capacity": 7 } }
            ],
            "buildings": [
                { "name": "lab", "role": { "kind": "research", "resources_consumption_rate": [0.5, 0, 0] } },
                { "name": "yard", "role": { "kind": "factory" } }
            ]
        }"#;
        let catalog = UnitCatalog::from_json_str(json).unwrap();
        let hauler = &catalog.ships()[0];
        assert_eq!(hauler.trader().map(|t| t.resource_carry_capacity), Some(7.0));
        assert_eq!(hauler.value, 1.0);
        assert_eq!(catalog.factory_building(), Some(BuildingArchetypeId(1)));
        let lab = &catalog.buildings()[0];
        assert_eq!(
            lab.research().map(|r| r.resources_consumption_rate()),
            Some(Vec3::new(0.5, 0.0, 0.0))
        );
    }

    #[test]
    fn empty_ship_list_is_rejected() {
        let err = UnitCatalog::from_json_str(r#"{ "ships": [] }"#).unwrap_err();
        assert!(matches!(err, UnitCatalogError::Invalid(_)));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let json = r#"{ "ships": [ { "name": "a" }, { "name": "a" } ] }"#;
        assert!(matches!(
            UnitCatalog::from_json_str(json),
            Err(UnitCatalogError::Invalid(_))
        ));
    }
}
