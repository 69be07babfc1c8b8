//! Randomized but format-valid input data for request bodies.
//!
//! Values are independent per call and carry no uniqueness guarantee; the
//! API under test decides how collisions are handled.

use rand::Rng;
use rand::rngs::ThreadRng;
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde::Serialize;

const TAX_ID_DIGITS: usize = 14;
const TAX_ID_UPPER: u64 = 100_000_000_000_000;

const SURNAMES: &[&str] = &[
    "Silva", "Souza", "Costa", "Santos", "Oliveira", "Pereira", "Rodrigues", "Almeida",
    "Nascimento", "Lima", "Araújo", "Fernandes", "Carvalho", "Gomes", "Martins", "Rocha",
    "Ribeiro", "Alves", "Monteiro", "Mendes", "Barros", "Freitas", "Barbosa", "Pinto",
];

const FIRST_NAMES: &[&str] = &[
    "Ana", "Bruno", "Camila", "Diego", "Eduarda", "Felipe", "Gabriela", "Heitor", "Isabela",
    "João", "Larissa", "Miguel", "Natália", "Otávio", "Paula", "Rafael", "Sofia", "Thiago",
];

const COMPANY_PREFIXES: &[&str] = &[
    "Mercado", "Supermercado", "Empório", "Armazém", "Hortifruti", "Mercearia", "Atacadão",
];

const COMPANY_SUFFIXES: &[&str] = &["Ltda", "S.A.", "e Filhos", "ME", "EIRELI", "Comércio"];

const STREET_KINDS: &[&str] = &["Rua", "Avenida", "Travessa", "Alameda", "Praça", "Rodovia"];

const STREET_NAMES: &[&str] = &[
    "das Flores", "São João", "Sete de Setembro", "XV de Novembro", "dos Andradas",
    "Presidente Vargas", "Rio Branco", "das Palmeiras", "Tiradentes", "Marechal Deodoro",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureKind {
    CompanyName,
    PersonName,
    /// 14 digit CNPJ-shaped string. Check digits are not computed.
    TaxId,
    StreetAddress,
}

pub struct FixtureGenerator<R = ThreadRng> {
    rng: R,
}

impl FixtureGenerator<ThreadRng> {
    /// Unseeded generator backed by the thread-local RNG.
    pub fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }
}

impl Default for FixtureGenerator<ThreadRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> FixtureGenerator<R> {
    pub fn from_rng(rng: R) -> Self {
        Self { rng }
    }

    pub fn generate(&mut self, kind: FixtureKind) -> String {
        match kind {
            FixtureKind::CompanyName => self.company_name(),
            FixtureKind::PersonName => self.person_name(),
            FixtureKind::TaxId => self.tax_id(),
            FixtureKind::StreetAddress => self.street_address(),
        }
    }

    pub fn company_name(&mut self) -> String {
        let prefix = self.pick(COMPANY_PREFIXES);
        let suffix = self.pick(COMPANY_SUFFIXES);

        if self.rng.gen_bool(0.5) {
            let first = self.pick(SURNAMES);
            let second = self.pick(SURNAMES);
            format!("{prefix} {first} & {second} {suffix}")
        } else {
            let surname = self.pick(SURNAMES);
            format!("{prefix} {surname} {suffix}")
        }
    }

    pub fn person_name(&mut self) -> String {
        let first = self.pick(FIRST_NAMES);
        let last = self.pick(SURNAMES);
        format!("{first} {last}")
    }

    pub fn tax_id(&mut self) -> String {
        let n = self.rng.gen_range(0..TAX_ID_UPPER);
        format!("{n:0width$}", width = TAX_ID_DIGITS)
    }

    pub fn street_address(&mut self) -> String {
        let kind = self.pick(STREET_KINDS);
        let name = self.pick(STREET_NAMES);
        let number = self.rng.gen_range(1..=9999);
        format!("{kind} {name}, {number}")
    }

    fn pick(&mut self, words: &[&'static str]) -> &'static str {
        words.choose(&mut self.rng).copied().unwrap_or_default()
    }
}
