//! Consistent pseudo-anonymization of tabular columns.
//!
//! Every distinct real value of a column is mapped once to a synthetic value
//! of the same category, and every occurrence is replaced with it. Synthetic
//! values follow Brazilian conventions (names, CPF/CNPJ with valid check
//! digits, +55 phone numbers, CEP addresses).

use crate::error::{Result, TemplateError};
use crate::tabular::Grid;
use chrono::NaiveDate;
use indexmap::{IndexMap, IndexSet};
use lazy_static::lazy_static;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Fresh draws tried before falling back to a numeric suffix
const MAX_RETRIES: usize = 8;

lazy_static! {
    static ref DATE_RANGE: (NaiveDate, NaiveDate) = (
        NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
    );
}

// ─── Categories ─────────────────────────────────────────────────────────────

/// Semantic category of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Name,
    Email,
    /// CPF or CNPJ, chosen per value by digit count
    Identifier,
    Phone,
    Address,
    Date,
}

impl FromStr for Category {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "nome" | "name" => Ok(Category::Name),
            "email" | "e-mail" => Ok(Category::Email),
            "cpf_cnpj" | "identifier" => Ok(Category::Identifier),
            "telefone" | "phone" => Ok(Category::Phone),
            "endereco" | "endereço" | "address" => Ok(Category::Address),
            "data" | "date" => Ok(Category::Date),
            other => Err(TemplateError::InvalidArgument(format!(
                "unknown category '{}' (expected nome, email, cpf_cnpj, telefone, endereco or data)",
                other
            ))),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Name => "nome",
            Category::Email => "email",
            Category::Identifier => "cpf_cnpj",
            Category::Phone => "telefone",
            Category::Address => "endereco",
            Category::Date => "data",
        };
        f.write_str(name)
    }
}

/// Kind of a Brazilian document number, decided by its digit count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    /// 11 digits
    Cpf,
    /// 14 digits
    Cnpj,
    Invalid,
}

/// Classify a raw identifier by the number of decimal digits it holds.
/// Punctuation is ignored.
pub fn classify_identifier(raw: &str) -> IdentifierKind {
    match raw.chars().filter(char::is_ascii_digit).count() {
        11 => IdentifierKind::Cpf,
        14 => IdentifierKind::Cnpj,
        _ => IdentifierKind::Invalid,
    }
}

/// True when a CPF or CNPJ carries correct check digits.
pub fn has_valid_check_digits(raw: &str) -> bool {
    let digits: Vec<u32> = raw.chars().filter_map(|c| c.to_digit(10)).collect();
    let (first, second): (&[u32], &[u32]) = match classify_identifier(raw) {
        IdentifierKind::Cpf => (&CPF_WEIGHTS[1..], &CPF_WEIGHTS[..]),
        IdentifierKind::Cnpj => (&CNPJ_WEIGHTS[1..], &CNPJ_WEIGHTS[..]),
        IdentifierKind::Invalid => return false,
    };
    let n = digits.len();
    check_digit(&digits[..n - 2], first) == digits[n - 2]
        && check_digit(&digits[..n - 1], second) == digits[n - 1]
}

// ─── Synthetic data ─────────────────────────────────────────────────────────

const FIRST_NAMES: &[&str] = &[
    "Adriana", "Alessandra", "Alice", "Aline", "Amanda", "Ana", "André", "Antônio",
    "Beatriz", "Bruna", "Bruno", "Caio", "Camila", "Carlos", "Carolina", "Cecília",
    "Clara", "Daniel", "Davi", "Diego", "Eduarda", "Eduardo", "Elaine", "Enzo",
    "Fábio", "Felipe", "Fernanda", "Francisco", "Gabriel", "Gabriela", "Giovanna",
    "Guilherme", "Gustavo", "Heitor", "Helena", "Henrique", "Igor", "Isabela",
    "Joana", "João", "Jorge", "José", "Júlia", "Juliana", "Larissa", "Laura",
    "Leonardo", "Letícia", "Lorena", "Lucas", "Luiz", "Manuela", "Marcelo",
    "Marcos", "Maria", "Mariana", "Matheus", "Miguel", "Natália", "Otávio",
    "Paulo", "Pedro", "Rafael", "Raquel", "Renata", "Ricardo", "Rodrigo",
    "Sabrina", "Samuel", "Sofia", "Tatiane", "Thiago", "Valentina", "Vinícius",
    "Vitória", "Yasmin",
];

const SURNAMES: &[&str] = &[
    "Almeida", "Alves", "Araújo", "Barbosa", "Barros", "Cardoso", "Carvalho",
    "Castro", "Cavalcanti", "Costa", "Cunha", "Dias", "Duarte", "Farias",
    "Fernandes", "Ferreira", "Freitas", "Gomes", "Lima", "Lopes", "Martins",
    "Melo", "Mendes", "Monteiro", "Moreira", "Moura", "Nascimento", "Nunes",
    "Oliveira", "Pereira", "Pinto", "Ramos", "Ribeiro", "Rocha", "Rodrigues",
    "Santos", "Silva", "Souza", "Teixeira", "Vieira",
];

const EMAIL_DOMAINS: &[&str] = &[
    "gmail.com", "hotmail.com", "outlook.com", "yahoo.com.br", "uol.com.br",
    "bol.com.br", "ig.com.br", "terra.com.br",
];

const STREET_PREFIXES: &[&str] = &[
    "Rua", "Avenida", "Travessa", "Alameda", "Praça", "Rodovia", "Estrada",
];

const NEIGHBORHOODS: &[&str] = &[
    "Centro", "Jardim América", "Vila Nova", "Boa Vista", "Santa Cruz",
    "São José", "Bela Vista", "Cidade Nova", "Liberdade", "Santo Antônio",
];

/// (city, state) pairs
const CITIES: &[(&str, &str)] = &[
    ("São Paulo", "SP"), ("Campinas", "SP"), ("Rio de Janeiro", "RJ"),
    ("Niterói", "RJ"), ("Belo Horizonte", "MG"), ("Curitiba", "PR"),
    ("Porto Alegre", "RS"), ("Florianópolis", "SC"), ("Salvador", "BA"),
    ("Recife", "PE"), ("Fortaleza", "CE"), ("Brasília", "DF"), ("Goiânia", "GO"),
    ("Manaus", "AM"), ("Belém", "PA"), ("Vitória", "ES"),
];

const AREA_CODES: &[u32] = &[
    11, 12, 19, 21, 24, 27, 31, 34, 41, 43, 47, 48, 51, 61, 62, 71, 81, 85, 91, 92,
];

const CPF_WEIGHTS: [u32; 10] = [11, 10, 9, 8, 7, 6, 5, 4, 3, 2];
const CNPJ_WEIGHTS: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

/// Modulo-11 check digit shared by CPF and CNPJ.
fn check_digit(digits: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();
    match sum % 11 {
        r if r < 2 => 0,
        r => 11 - r,
    }
}

fn ascii_fold(text: &str) -> String {
    text.chars()
        .map(|ch| match ch {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        })
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// Generator of synthetic pt-BR values.
pub struct FakeData<R: Rng> {
    rng: R,
}

impl FakeData<StdRng> {
    /// Seeded generators repeat the same sequence; `None` seeds from the OS.
    pub fn from_seed(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::new(rng)
    }
}

impl<R: Rng> FakeData<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.rng.random_range(0..items.len())]
    }

    fn digits(&mut self, n: usize) -> Vec<u32> {
        (0..n).map(|_| self.rng.random_range(0..10)).collect()
    }

    pub fn name(&mut self) -> String {
        let first = *self.pick(FIRST_NAMES);
        let last = *self.pick(SURNAMES);
        if self.rng.random_bool(0.4) {
            let middle = *self.pick(SURNAMES);
            format!("{} {} {}", first, middle, last)
        } else {
            format!("{} {}", first, last)
        }
    }

    pub fn email(&mut self) -> String {
        let first = ascii_fold(&self.pick(FIRST_NAMES).to_lowercase());
        let last = ascii_fold(&self.pick(SURNAMES).to_lowercase());
        let domain = *self.pick(EMAIL_DOMAINS);
        match self.rng.random_range(0..3) {
            0 => format!("{}.{}@{}", first, last, domain),
            1 => format!("{}{}@{}", first, self.rng.random_range(1..100), domain),
            _ => format!("{}_{}{}@{}", first, last, self.rng.random_range(1..10), domain),
        }
    }

    /// `XXX.XXX.XXX-XX` with valid check digits.
    pub fn cpf(&mut self) -> String {
        let mut d = self.digits(9);
        d.push(check_digit(&d, &CPF_WEIGHTS[1..]));
        d.push(check_digit(&d, &CPF_WEIGHTS));
        let s: String = d.iter().map(|n| char::from(b'0' + *n as u8)).collect();
        format!("{}.{}.{}-{}", &s[0..3], &s[3..6], &s[6..9], &s[9..11])
    }

    /// `XX.XXX.XXX/0001-XX` with valid check digits.
    pub fn cnpj(&mut self) -> String {
        let mut d = self.digits(8);
        d.extend([0, 0, 0, 1]);
        d.push(check_digit(&d, &CNPJ_WEIGHTS[1..]));
        d.push(check_digit(&d, &CNPJ_WEIGHTS));
        let s: String = d.iter().map(|n| char::from(b'0' + *n as u8)).collect();
        format!(
            "{}.{}.{}/{}-{}",
            &s[0..2],
            &s[2..5],
            &s[5..8],
            &s[8..12],
            &s[12..14]
        )
    }

    /// Mobile number, `+55 (DD) 9XXXX-XXXX`.
    pub fn phone(&mut self) -> String {
        let area = *self.pick(AREA_CODES);
        format!(
            "+55 ({}) 9{:04}-{:04}",
            area,
            self.rng.random_range(0..10_000),
            self.rng.random_range(0..10_000)
        )
    }

    /// Single-line street address ending in the CEP.
    pub fn address(&mut self) -> String {
        let prefix = *self.pick(STREET_PREFIXES);
        let street = if self.rng.random_bool(0.5) {
            format!("{} {}", self.pick(FIRST_NAMES), self.pick(SURNAMES))
        } else {
            self.pick(SURNAMES).to_string()
        };
        let number = self.rng.random_range(1..2_000);
        let neighborhood = *self.pick(NEIGHBORHOODS);
        let (city, state) = *self.pick(CITIES);
        format!(
            "{} {}, {} - {}, {} / {}, {:05}-{:03}",
            prefix,
            street,
            number,
            neighborhood,
            city,
            state,
            self.rng.random_range(1_000..100_000),
            self.rng.random_range(0..1_000)
        )
    }

    /// ISO date between 1970-01-01 and 2024-12-31.
    pub fn date(&mut self) -> String {
        let (start, end) = *DATE_RANGE;
        let offset = self.rng.random_range(0..=(end - start).num_days());
        (start + chrono::Duration::days(offset))
            .format("%Y-%m-%d")
            .to_string()
    }

    /// One synthetic value for `raw`. Identifiers follow the kind of `raw`;
    /// every other category ignores it.
    pub fn generate(&mut self, category: Category, raw: &str) -> Option<String> {
        Some(match category {
            Category::Name => self.name(),
            Category::Email => self.email(),
            Category::Identifier => match classify_identifier(raw) {
                IdentifierKind::Cpf => self.cpf(),
                IdentifierKind::Cnpj => self.cnpj(),
                IdentifierKind::Invalid => return None,
            },
            Category::Phone => self.phone(),
            Category::Address => self.address(),
            Category::Date => self.date(),
        })
    }

    /// `count` synthetic values of a category. Identifiers have no kind
    /// without a real value to follow, so they are rejected.
    pub fn values(&mut self, category: Category, count: usize) -> Result<Vec<String>> {
        if category == Category::Identifier {
            return Err(TemplateError::InvalidArgument(format!(
                "{} values follow the kind of each real value; use generate",
                category
            )));
        }
        Ok((0..count)
            .filter_map(|_| self.generate(category, ""))
            .collect())
    }
}

// ─── Remapping ──────────────────────────────────────────────────────────────

/// Replace every value of `column` with a synthetic one, consistently.
/// Returns the mapping applied, in order of first appearance.
pub fn remap_column(
    grid: &mut Grid,
    column: &str,
    category: Category,
    seed: Option<u64>,
) -> Result<IndexMap<String, String>> {
    let mut fake = FakeData::from_seed(seed);
    remap_column_with(grid, column, category, &mut fake)
}

/// [`remap_column`] drawing from a caller-owned generator, so several
/// columns can share one seeded sequence.
pub fn remap_column_with<R: Rng>(
    grid: &mut Grid,
    column: &str,
    category: Category,
    fake: &mut FakeData<R>,
) -> Result<IndexMap<String, String>> {
    let index = grid.column_index(column).ok_or_else(|| {
        TemplateError::InvalidArgument(format!("column '{}' not found", column))
    })?;

    // empty cells hold no real value
    let distinct: IndexSet<String> = grid
        .column_values(index)
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .collect();

    if category == Category::Identifier {
        if let Some(bad) = distinct
            .iter()
            .find(|v| classify_identifier(v) == IdentifierKind::Invalid)
        {
            return Err(TemplateError::InvalidArgument(format!(
                "'{}' in column '{}' is neither an 11-digit CPF nor a 14-digit CNPJ",
                bad, column
            )));
        }
    }

    let mut used: HashSet<String> = HashSet::with_capacity(distinct.len());
    let mut mapping = IndexMap::with_capacity(distinct.len());
    for raw in distinct {
        let synthetic = unique_value(fake, category, &raw, &mut used)?;
        mapping.insert(raw, synthetic);
    }

    grid.map_column(index, |v| mapping.get(v).cloned());
    log::info!(
        "Remapped {} distinct values of column '{}' as {}",
        mapping.len(),
        column,
        category
    );
    Ok(mapping)
}

fn draw<R: Rng>(fake: &mut FakeData<R>, category: Category, raw: &str) -> Result<String> {
    fake.generate(category, raw).ok_or_else(|| {
        TemplateError::InvalidArgument(format!("cannot synthesize {} for '{}'", category, raw))
    })
}

fn unique_value<R: Rng>(
    fake: &mut FakeData<R>,
    category: Category,
    raw: &str,
    used: &mut HashSet<String>,
) -> Result<String> {
    let mut candidate = draw(fake, category, raw)?;
    for _ in 0..MAX_RETRIES {
        if !used.contains(&candidate) {
            break;
        }
        candidate = draw(fake, category, raw)?;
    }
    // If still taken after retries, add a number
    let base = candidate.clone();
    let mut suffix = 2;
    while used.contains(&candidate) {
        candidate = format!("{} {}", base, suffix);
        suffix += 1;
    }
    used.insert(candidate.clone());
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(values: &[&str]) -> Grid {
        Grid::new(
            vec!["id".to_string(), "valor".to_string()],
            values
                .iter()
                .enumerate()
                .map(|(i, v)| vec![i.to_string(), v.to_string()])
                .collect(),
        )
    }

    fn column(grid: &Grid, name: &str) -> Vec<String> {
        let index = grid.column_index(name).unwrap();
        grid.column_values(index).map(str::to_string).collect()
    }

    #[test]
    fn test_classify_identifier() {
        assert_eq!(classify_identifier("123.456.789-09"), IdentifierKind::Cpf);
        assert_eq!(classify_identifier("12.345.678/0001-95"), IdentifierKind::Cnpj);
        assert_eq!(classify_identifier("abc"), IdentifierKind::Invalid);
        assert_eq!(classify_identifier("1234"), IdentifierKind::Invalid);
    }

    #[test]
    fn test_check_digits_of_known_numbers() {
        assert!(has_valid_check_digits("123.456.789-09"));
        assert!(!has_valid_check_digits("123.456.789-10"));
        assert!(has_valid_check_digits("12.345.678/0001-95"));
        assert!(!has_valid_check_digits("12.345.678/0001-96"));
        assert!(!has_valid_check_digits("abc"));
    }

    #[test]
    fn test_generated_identifiers_are_valid() {
        let mut fake = FakeData::from_seed(Some(7));
        for _ in 0..50 {
            let cpf = fake.cpf();
            assert_eq!(cpf.len(), 14);
            assert!(has_valid_check_digits(&cpf), "{}", cpf);
            let cnpj = fake.cnpj();
            assert_eq!(cnpj.len(), 18);
            assert!(cnpj.contains("/0001-"));
            assert!(has_valid_check_digits(&cnpj), "{}", cnpj);
        }
    }

    #[test]
    fn test_generated_formats() {
        let mut fake = FakeData::from_seed(Some(1));
        for _ in 0..20 {
            let email = fake.email();
            let (local, domain) = email.split_once('@').unwrap();
            assert!(local.is_ascii() && !local.is_empty());
            assert!(EMAIL_DOMAINS.contains(&domain));

            let phone = fake.phone();
            assert!(phone.starts_with("+55 ("));
            assert_eq!(phone.len(), "+55 (11) 91234-5678".len());

            let date = NaiveDate::parse_from_str(&fake.date(), "%Y-%m-%d").unwrap();
            assert!(date >= DATE_RANGE.0 && date <= DATE_RANGE.1);

            assert!(fake.name().contains(' '));
            assert!(fake.address().contains(" / "));
        }
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("nome".parse::<Category>().unwrap(), Category::Name);
        assert_eq!("PHONE".parse::<Category>().unwrap(), Category::Phone);
        assert_eq!("cpf_cnpj".parse::<Category>().unwrap(), Category::Identifier);
        assert_eq!(Category::Address.to_string(), "endereco");
        assert!(matches!(
            "salario".parse::<Category>(),
            Err(TemplateError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_remap_is_consistent_and_one_to_one() {
        let mut g = grid(&["Ana", "Bia", "Ana", "Caio", "Bia", "Ana"]);
        let mapping = remap_column(&mut g, "valor", Category::Name, Some(42)).unwrap();
        assert_eq!(mapping.len(), 3);
        assert_eq!(mapping.keys().collect::<Vec<_>>(), vec!["Ana", "Bia", "Caio"]);

        let out = column(&g, "valor");
        assert_eq!(out[0], out[2]);
        assert_eq!(out[0], out[5]);
        assert_eq!(out[1], out[4]);
        let distinct: HashSet<&String> = out.iter().collect();
        assert_eq!(distinct.len(), 3);
        assert_eq!(out[0], mapping["Ana"]);
        // other columns untouched
        assert_eq!(column(&g, "id"), vec!["0", "1", "2", "3", "4", "5"]);
    }

    #[test]
    fn test_same_seed_same_output() {
        let input = grid(&["a@x.com", "b@x.com", "a@x.com"]);
        let mut first = input.clone();
        let mut second = input.clone();
        remap_column(&mut first, "valor", Category::Email, Some(99)).unwrap();
        remap_column(&mut second, "valor", Category::Email, Some(99)).unwrap();
        assert_eq!(first, second);
        assert_ne!(first, input);
    }

    #[test]
    fn test_identifier_kind_is_kept_per_value() {
        let mut g = grid(&["123.456.789-09", "12.345.678/0001-95", "123.456.789-09"]);
        let mapping = remap_column(&mut g, "valor", Category::Identifier, Some(3)).unwrap();
        assert_eq!(classify_identifier(&mapping["123.456.789-09"]), IdentifierKind::Cpf);
        assert_eq!(classify_identifier(&mapping["12.345.678/0001-95"]), IdentifierKind::Cnpj);
    }

    #[test]
    fn test_invalid_identifier_fails_before_changes() {
        let mut g = grid(&["123.456.789-09", "n/a"]);
        let before = g.clone();
        let err = remap_column(&mut g, "valor", Category::Identifier, Some(3)).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("n/a") && msg.contains("valor"), "{}", msg);
        assert_eq!(g, before);
    }

    #[test]
    fn test_empty_cells_and_unknown_column() {
        let mut g = grid(&["Ana", "", "Ana"]);
        let mapping = remap_column(&mut g, "valor", Category::Name, Some(5)).unwrap();
        assert_eq!(mapping.len(), 1);
        assert_eq!(column(&g, "valor")[1], "");

        assert!(matches!(
            remap_column(&mut g, "cpf", Category::Name, None),
            Err(TemplateError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_values_count() {
        let mut fake = FakeData::from_seed(Some(11));
        assert_eq!(fake.values(Category::Date, 5).unwrap().len(), 5);
        assert_eq!(fake.values(Category::Phone, 0).unwrap().len(), 0);
        assert!(matches!(
            fake.values(Category::Identifier, 3),
            Err(TemplateError::InvalidArgument(_))
        ));
    }
}
