use std::collections::BTreeMap;

use serde::Deserialize;

use crate::fixture::FixtureKind;

/// A contract file as written on disk.
#[derive(Deserialize, Debug, Clone)]
pub struct ContractFile {
    pub setup: Setup,
    #[serde(default)]
    pub global: Global,
    pub tests: Vec<Test>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Global {
    pub headers: Option<toml::Value>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Setup {
    pub name: String,
    pub base_url: String,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub fixtures: BTreeMap<String, FixtureKind>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Test {
    pub name: String,
    pub method: String,
    pub url: String,
    pub headers: Option<toml::Value>,
    pub body: Option<serde_json::Value>,
    pub assert_status: u16,
    pub assert_headers: Option<toml::Value>,
    pub assert_json: Option<serde_json::Value>,
    pub assert_json_like: Option<serde_json::Value>,
    pub assert_schema: Option<serde_json::Value>,
    #[serde(default)]
    pub capture: BTreeMap<String, String>,
    pub log: Option<String>,
}
