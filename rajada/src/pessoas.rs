//! Bulk insert-then-fetch workload against a `/pessoas` API.
//!
//! Each virtual user posts a freshly generated [`Person`] and, if the API answered
//! `201 Created`, fetches the resource at the returned `Location`.
//!
//! ```no_run
//! use rajada::{aggregate::RunSummary, config::SimulationConfig, pessoas};
//!
//! # async fn run() -> Result<(), rajada::Error> {
//! let config = SimulationConfig::default().apply_env();
//! let report = pessoas::simulation(&config)?.run::<RunSummary>().await?;
//! println!("{} executions completed", report.aggregate.completed);
//! # Ok(())
//! # }
//! ```
use std::{sync::Arc, time::Duration};

use chrono::{Datelike, NaiveDate, Utc};
use rand::{Rng, seq::SliceRandom};
use uuid::Uuid;

use crate::{
    client::HttpClient,
    config::SimulationConfig,
    error::{ConfigError, FeederError},
    feeder::{Feeder, Record},
    injector::OpenInjector,
    scenario::Scenario,
    session::Value,
    simulation::Simulation,
    step::{Condition, Method, Request, SaveRule, header},
};

/// Body of the creation request. `stack` is a list and renders as `"a","b"`.
pub const BODY: &str =
    r##"{"id":"#{id}","apelido":"#{apelido}","nome":"#{nome}","nascimento":"#{nascimento}","stack":[#{stack}]}"##;

pub const FIELDS: [&str; 5] = ["id", "apelido", "nome", "nascimento", "stack"];

const FIRST_NAMES: &[&str] = &[
    "Ana", "Beatriz", "Bruna", "Camila", "Carla", "Daniela", "Eduarda", "Fernanda",
    "Gabriela", "Helena", "Isabela", "Júlia", "Larissa", "Letícia", "Luana", "Mariana",
    "Natália", "Patrícia", "Rafaela", "Sofia", "Vitória", "Alexandre", "André", "Bruno",
    "Caio", "Carlos", "Daniel", "Eduardo", "Felipe", "Gabriel", "Gustavo", "Henrique",
    "João", "José", "Leonardo", "Lucas", "Marcelo", "Mateus", "Paulo", "Pedro",
    "Rafael", "Ricardo", "Rodrigo", "Thiago", "Vinícius",
];

const LAST_NAMES: &[&str] = &[
    "Almeida", "Alves", "Araújo", "Barbosa", "Batista", "Cardoso", "Carvalho", "Castro",
    "Correia", "Costa", "Dias", "Fernandes", "Ferreira", "Gomes", "Lima", "Lopes",
    "Machado", "Martins", "Melo", "Mendes", "Moraes", "Moreira", "Nascimento", "Oliveira",
    "Pereira", "Pinto", "Ramos", "Reis", "Ribeiro", "Rocha", "Rodrigues", "Santos",
    "Silva", "Soares", "Souza", "Teixeira", "Vieira",
];

const LANGUAGES: &[&str] = &[
    "Ada", "Assembly", "C", "C#", "C++", "Clojure", "COBOL", "Crystal", "D", "Dart",
    "Elixir", "Elm", "Erlang", "F#", "Fortran", "Go", "Groovy", "Haskell", "Java",
    "JavaScript", "Julia", "Kotlin", "Lisp", "Lua", "Nim", "OCaml", "Pascal", "Perl",
    "PHP", "Prolog", "Python", "R", "Ruby", "Rust", "Scala", "Scheme", "Smalltalk",
    "Swift", "TypeScript", "Zig",
];

pub const MAX_STACK: usize = 32;

/// One generated payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: Uuid,
    pub apelido: String,
    pub nome: String,
    pub nascimento: NaiveDate,
    pub stack: Vec<String>,
}

impl From<Person> for Record {
    fn from(person: Person) -> Self {
        [
            ("id", Value::Text(person.id.to_string())),
            ("apelido", Value::Text(person.apelido)),
            ("nome", Value::Text(person.nome)),
            ("nascimento", Value::Text(person.nascimento.format("%Y-%m-%d").to_string())),
            ("stack", Value::List(person.stack)),
        ]
        .into_iter()
        .collect()
    }
}

/// Generates random Brazilian-Portuguese people, each with a new v4 id.
#[derive(Debug, Clone)]
pub struct PersonFeeder {
    languages: Vec<String>,
}

impl Default for PersonFeeder {
    fn default() -> Self {
        Self::with_languages(LANGUAGES.iter().map(|s| s.to_string()))
    }
}

impl PersonFeeder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples stacks from `languages` instead of the built-in list.
    pub fn with_languages(languages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            languages: languages.into_iter().map(Into::into).collect(),
        }
    }

    pub fn generate(&self) -> Result<Person, FeederError> {
        self.check_languages()?;
        let mut rng = rand::thread_rng();

        let first = pick(&mut rng, FIRST_NAMES)?;
        let middle = pick(&mut rng, LAST_NAMES)?;
        let last = pick(&mut rng, LAST_NAMES)?;
        let len = rng.gen_range(1..=MAX_STACK);
        let stack = (0..len)
            .map(|_| self.languages.choose(&mut rng).cloned())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| FeederError::Generation("language list is empty".into()))?;

        Ok(Person {
            id: Uuid::new_v4(),
            apelido: first.to_owned(),
            nome: format!("{first} {middle} {last}"),
            nascimento: birthday(&mut rng)?,
            stack,
        })
    }

    fn check_languages(&self) -> Result<(), FeederError> {
        if self.languages.is_empty() {
            return Err(FeederError::Generation("language list is empty".into()));
        }
        match self
            .languages
            .iter()
            .find(|l| l.trim().is_empty() || l.contains('"'))
        {
            Some(bad) => Err(FeederError::Generation(format!(
                "language {bad:?} cannot be embedded in a JSON string"
            ))),
            None => Ok(()),
        }
    }
}

impl Feeder for PersonFeeder {
    fn next(&self) -> Result<Record, FeederError> {
        self.generate().map(Record::from)
    }
}

fn pick<'a>(rng: &mut impl Rng, items: &[&'a str]) -> Result<&'a str, FeederError> {
    items
        .choose(rng)
        .copied()
        .ok_or_else(|| FeederError::Generation("name list is empty".into()))
}

/// Someone between 18 and 65 years old today.
fn birthday(rng: &mut impl Rng) -> Result<NaiveDate, FeederError> {
    let today = Utc::now().date_naive();
    let youngest = today.num_days_from_ce() - 18 * 365;
    let oldest = today.num_days_from_ce() - 65 * 365;
    NaiveDate::from_num_days_from_ce_opt(rng.gen_range(oldest..=youngest))
        .ok_or_else(|| FeederError::Generation("birth date out of range".into()))
}

/// Insert-then-fetch scenario.
///
/// 1. `POST /pessoas` with [`BODY`], accepting 201, 400 and 422. The status lands in
///    `httpStatus`; only a 201 saves the `Location` header as `location`.
/// 2. A uniform pause between `pause_min` and `pause_max`.
/// 3. `GET #{location}` when `location` was saved.
pub fn scenario(request_timeout: Duration, pause_min: Duration, pause_max: Duration) -> Scenario {
    Scenario::new("Inserção em massa de dados")
        .requires(FIELDS)
        .exec(
            Request::builder()
                .name("criando")
                .method(Method::Post)
                .url("/pessoas")
                .headers(vec![header("Content-Type", "application/json")])
                .body(BODY)
                .timeout(request_timeout)
                .accept(vec![201, 400, 422])
                .save(vec![
                    SaveRule::status("httpStatus"),
                    SaveRule::header("Location", "location")
                        .when(Condition::equals("httpStatus", 201u16)),
                ])
                .build(),
        )
        .pause(pause_min, pause_max)
        .do_if(
            Condition::exists("location"),
            vec![
                Request::builder()
                    .name("consultando")
                    .url("#{location}")
                    .build()
                    .into(),
            ],
        )
}

/// The full pessoas simulation described by `config`, talking HTTP.
pub fn simulation(
    config: &SimulationConfig,
) -> Result<Simulation<HttpClient, PersonFeeder, OpenInjector>, ConfigError> {
    config.validate()?;
    let client = HttpClient::new(&config.protocol)?;
    Ok(Simulation::builder()
        .scenario(scenario(config.request_timeout, config.pause_min, config.pause_max))
        .feeder(Arc::new(PersonFeeder::new()))
        .client(Arc::new(client))
        .injector(OpenInjector::from_config(config))
        .build())
}
