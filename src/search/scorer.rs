use super::corpus::IndexedEntry;
use super::tokenizer::{TokenMatch, best_match};
use super::types::{SearchFilters, SearchResultType};

/// Points for an exact and a prefix hit in one field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldWeight {
    pub exact: f64,
    pub prefix: f64,
}

impl FieldWeight {
    const fn new(exact: f64, prefix: f64) -> Self {
        Self { exact, prefix }
    }

    fn points(&self, hit: TokenMatch) -> f64 {
        match hit {
            TokenMatch::Exact => self.exact,
            TokenMatch::Prefix => self.prefix,
        }
    }
}

/// Score weights for one search context.
///
/// Searching globally, the brand name is a strong signal and brand rows get
/// a bonus so a brand outranks its own materials. Inside a brand filter every
/// candidate shares the brand, so the item's own name carries the ranking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub name: FieldWeight,
    pub brand_name: FieldWeight,
    pub material_type: FieldWeight,
    /// Brand rows only
    pub slug: FieldWeight,
    /// Added once to brand rows
    pub brand_bonus: f64,
    /// Added once to material rows, kept below `brand_bonus`
    pub material_bonus: f64,
}

pub const GLOBAL_WEIGHTS: ScoreWeights = ScoreWeights {
    name: FieldWeight::new(100.0, 60.0),
    brand_name: FieldWeight::new(80.0, 50.0),
    material_type: FieldWeight::new(40.0, 25.0),
    slug: FieldWeight::new(30.0, 20.0),
    brand_bonus: 50.0,
    material_bonus: 30.0,
};

pub const BRAND_FILTERED_WEIGHTS: ScoreWeights = ScoreWeights {
    name: FieldWeight::new(100.0, 70.0),
    brand_name: FieldWeight::new(20.0, 10.0),
    material_type: FieldWeight::new(40.0, 25.0),
    slug: FieldWeight::new(30.0, 20.0),
    brand_bonus: 0.0,
    material_bonus: 0.0,
};

/// Name and brand tokens beyond this start costing points
const CONCISE_TOKEN_COUNT: usize = 6;
const LONG_NAME_PENALTY: f64 = 2.0;

impl ScoreWeights {
    pub fn for_filters(filters: &SearchFilters) -> &'static ScoreWeights {
        if filters.brand_filter().is_some() {
            &BRAND_FILTERED_WEIGHTS
        } else {
            &GLOBAL_WEIGHTS
        }
    }
}

/// Score one entry against a tokenized query.
///
/// Every query token has to hit some field, otherwise the entry scores 0.
/// Each token adds the points of its strongest field hit.
pub fn score(entry: &IndexedEntry, query_tokens: &[String], filters: &SearchFilters) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }

    let weights = ScoreWeights::for_filters(filters);
    let fields = [
        (&entry.name_tokens, weights.name),
        (&entry.brand_tokens, weights.brand_name),
        (&entry.material_type_tokens, weights.material_type),
        (&entry.slug_tokens, weights.slug),
    ];

    let mut total = 0.0;
    for query_token in query_tokens {
        let best = fields
            .iter()
            .filter_map(|(tokens, weight)| best_match(query_token, tokens).map(|hit| weight.points(hit)))
            .fold(None, |best: Option<f64>, points| Some(best.map_or(points, |b| b.max(points))));

        match best {
            Some(points) => total += points,
            None => return 0.0,
        }
    }

    // Global salience: brands, then materials, then packages and containers
    total += match entry.result.result_type {
        SearchResultType::Brand => weights.brand_bonus,
        SearchResultType::Material => weights.material_bonus,
        SearchResultType::Package | SearchResultType::Container => 0.0,
    };

    // Prefer concise names, but never push a full match out of the results
    let token_count = entry.name_tokens.len() + entry.brand_tokens.len();
    if token_count > CONCISE_TOKEN_COUNT {
        let penalty = (token_count - CONCISE_TOKEN_COUNT) as f64 * LONG_NAME_PENALTY;
        total = (total - penalty).max(1.0);
    }

    total
}
