use contactgen_core::Gender;
use tracing::warn;

use crate::assets::AssetsLoader;
use crate::errors::GenerationError;

pub const MALE_NAMES_ASSET: &str = "male_names.txt";
pub const FEMALE_NAMES_ASSET: &str = "female_names.txt";
pub const SURNAMES_ASSET: &str = "surnames.txt";

/// First names per gender plus an optional surname list.
///
/// When `surnames` is `None` the generator falls back to the `fake` surname
/// corpus.
#[derive(Debug, Clone)]
pub struct NameCorpus {
    male: Vec<String>,
    female: Vec<String>,
    surnames: Option<Vec<String>>,
}

impl NameCorpus {
    pub fn new(male: Vec<String>, female: Vec<String>, surnames: Option<Vec<String>>) -> Self {
        Self {
            male,
            female,
            surnames,
        }
    }

    /// Built-in lists used when no asset directory is configured.
    pub fn builtin() -> Self {
        Self {
            male: to_owned(DEFAULT_MALE_NAMES),
            female: to_owned(DEFAULT_FEMALE_NAMES),
            surnames: None,
        }
    }

    /// Loads each list from `loader`; a missing file keeps the built-in list.
    ///
    /// An asset that exists but holds no names is kept empty, so generating
    /// that gender later fails with a data source error.
    pub fn load(loader: &AssetsLoader) -> Result<Self, GenerationError> {
        let mut corpus = Self::builtin();

        if let Some(male) = loader.load_lines(MALE_NAMES_ASSET)? {
            warn_if_empty(loader, MALE_NAMES_ASSET, &male);
            corpus.male = male;
        }
        if let Some(female) = loader.load_lines(FEMALE_NAMES_ASSET)? {
            warn_if_empty(loader, FEMALE_NAMES_ASSET, &female);
            corpus.female = female;
        }
        if let Some(surnames) = loader.load_lines(SURNAMES_ASSET)? {
            warn_if_empty(loader, SURNAMES_ASSET, &surnames);
            corpus.surnames = Some(surnames);
        }

        Ok(corpus)
    }

    pub fn first_names(&self, gender: Gender) -> &[String] {
        match gender {
            Gender::Male => &self.male,
            Gender::Female => &self.female,
        }
    }

    pub fn surnames(&self) -> Option<&[String]> {
        self.surnames.as_deref()
    }
}

fn warn_if_empty(loader: &AssetsLoader, asset: &str, values: &[String]) {
    if values.is_empty() {
        warn!(
            root = %loader.root().display(),
            asset,
            "name asset is empty"
        );
    }
}

fn to_owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

const DEFAULT_MALE_NAMES: &[&str] = &[
    "James", "John", "Robert", "Michael", "William", "David", "Richard", "Joseph", "Thomas",
    "Charles", "Daniel", "Matthew", "Anthony", "Mark", "Paul", "Steven", "Andrew", "Kenneth",
    "Joshua", "Kevin", "Brian", "George", "Edward", "Ronald", "Timothy", "Jason", "Jeffrey",
    "Ryan", "Jacob", "Gary",
];

const DEFAULT_FEMALE_NAMES: &[&str] = &[
    "Mary", "Patricia", "Jennifer", "Linda", "Elizabeth", "Barbara", "Susan", "Jessica",
    "Sarah", "Karen", "Lisa", "Nancy", "Betty", "Margaret", "Sandra", "Ashley", "Kimberly",
    "Emily", "Donna", "Michelle", "Carol", "Amanda", "Dorothy", "Melissa", "Deborah",
    "Stephanie", "Rebecca", "Sharon", "Laura", "Cynthia",
];
