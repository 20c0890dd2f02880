use std::sync::Arc;

use contactgen_core::{DEFAULT_MARKER, Gender, GenderFilter, Record};
use fake::Fake;
use fake::faker::name::en::LastName;
use fake::faker::phone_number::en::PhoneNumber;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::corpus::NameCorpus;
use crate::errors::GenerationError;
use crate::photos::identicon;

/// Produces one synthetic record per call.
pub trait RecordSource: Send {
    fn next_record(&mut self, filter: GenderFilter) -> Result<Record, GenerationError>;
}

/// Builds a fresh [`RecordSource`] for each generation session.
pub trait SourceFactory: Send + Sync {
    fn create(&self, with_photos: bool) -> Result<Box<dyn RecordSource>, GenerationError>;
}

/// Seeded record generator backed by a [`NameCorpus`].
#[derive(Debug)]
pub struct RecordGenerator {
    corpus: Arc<NameCorpus>,
    rng: ChaCha8Rng,
    marker: String,
    with_photos: bool,
    issued: u64,
}

impl RecordGenerator {
    pub fn new(corpus: Arc<NameCorpus>, seed: u64, marker: impl Into<String>, with_photos: bool) -> Self {
        Self {
            corpus,
            rng: ChaCha8Rng::seed_from_u64(seed),
            marker: marker.into(),
            with_photos,
            issued: 0,
        }
    }

    pub fn next(&mut self, filter: GenderFilter) -> Result<Record, GenerationError> {
        let gender = match filter.fixed() {
            Some(gender) => gender,
            None if self.rng.random_bool(0.5) => Gender::Male,
            None => Gender::Female,
        };

        let first = pick(self.corpus.first_names(gender), &mut self.rng)
            .ok_or_else(|| {
                GenerationError::DataSource(format!("no {gender} first names available"))
            })?
            .to_string();
        let last = match self.corpus.surnames() {
            Some(surnames) => pick(surnames, &mut self.rng)
                .ok_or_else(|| GenerationError::DataSource("no surnames available".to_string()))?
                .to_string(),
            None => LastName().fake_with_rng(&mut self.rng),
        };
        let phone: String = PhoneNumber().fake_with_rng(&mut self.rng);

        self.issued += 1;
        let display_name = format!("{first} {last}");
        let email = email_for(&first, &last, self.issued, &self.marker);
        let image = self.with_photos.then(|| identicon(&display_name));

        debug!(serial = self.issued, %gender, "record generated");
        Ok(Record::new(display_name, phone, email, gender, image))
    }
}

impl RecordSource for RecordGenerator {
    fn next_record(&mut self, filter: GenderFilter) -> Result<Record, GenerationError> {
        self.next(filter)
    }
}

/// Creates [`RecordGenerator`]s sharing one corpus.
///
/// With a fixed seed every session replays the same sequence; otherwise each
/// session draws its own seed.
#[derive(Debug, Clone)]
pub struct GeneratorFactory {
    corpus: Arc<NameCorpus>,
    marker: String,
    seed: Option<u64>,
}

impl GeneratorFactory {
    pub fn new(corpus: NameCorpus) -> Self {
        Self {
            corpus: Arc::new(corpus),
            marker: DEFAULT_MARKER.to_string(),
            seed: None,
        }
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }
}

impl SourceFactory for GeneratorFactory {
    fn create(&self, with_photos: bool) -> Result<Box<dyn RecordSource>, GenerationError> {
        let seed = self.seed.unwrap_or_else(rand::random);
        debug!(seed, with_photos, "record generator created");
        Ok(Box::new(RecordGenerator::new(
            Arc::clone(&self.corpus),
            seed,
            self.marker.clone(),
            with_photos,
        )))
    }
}

fn pick<'a>(values: &'a [String], rng: &mut impl Rng) -> Option<&'a str> {
    if values.is_empty() {
        return None;
    }
    let idx = rng.random_range(0..values.len());
    values.get(idx).map(String::as_str)
}

fn email_for(first: &str, last: &str, serial: u64, marker: &str) -> String {
    let first = slugify(first);
    let last = slugify(last);
    let local = match (first.is_empty(), last.is_empty()) {
        (false, false) => format!("{first}.{last}"),
        (false, true) => first,
        (true, false) => last,
        (true, true) => "contact".to_string(),
    };
    format!("{local}{serial}@{marker}")
}

fn slugify(value: &str) -> String {
    value
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .flat_map(|ch| ch.to_lowercase())
        .collect()
}
