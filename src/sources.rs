//! Provider payloads and their conversion into pipeline input.
//!
//! Two sources feed the pipeline: Google Places text search (consumer-facing
//! businesses with ratings) and the Brønnøysund entity registry (recently
//! registered companies). Both are reduced to [`BusinessRecord`]s here; the
//! HTTP side lives in `services`.

use crate::models::{BusinessIdentity, BusinessRecord, LeadSource};
use chrono::NaiveDate;
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use serde::Deserialize;

// ============ Google Places ============

/// Transit and travel place types that are never leads.
pub const EXCLUDED_PLACE_TYPES: &[&str] = &[
    "airport",
    "bus_station",
    "bus_stop",
    "ferry_terminal",
    "light_rail_station",
    "subway_station",
    "train_station",
    "transit_station",
];

/// Places type → display industry. First matching type wins.
pub const PLACE_INDUSTRIES: &[(&str, &str)] = &[
    ("plumber", "Plumber"),
    ("electrician", "Electrician"),
    ("painter", "Painter"),
    ("florist", "Florist"),
    ("cafe", "Cafe"),
    ("bakery", "Bakery"),
    ("hair_care", "Hair Salon"),
    ("beauty_salon", "Hair Salon"),
    ("car_repair", "Auto Repair"),
    ("car_wash", "Auto Repair"),
    ("furniture_store", "Carpenter"),
    ("home_improvement_store", "Carpenter"),
    ("house_cleaning", "Cleaning Service"),
];

/// Trade keywords searched for in the target municipality.
pub const PLACE_QUERIES: &[&str] = &[
    "frisor",
    "regnskapsforer",
    "bilverksted",
    "bilpleie",
    "rørlegger",
    "elektriker",
    "snekker",
    "tømrer",
    "maler",
    "renhold",
    "blomsterbutikk",
    "bakeri",
    "kafe",
    "restaurant",
    "dagligvare",
    "tannlege",
    "legekontor",
    "fysioterapi",
    "vaktmester",
    "glassmester",
    "rør",
    "taktekker",
    "møbelsnekker",
    "byggservice",
    "fotograf",
    "skredder",
    "hudpleie",
    "neglesalong",
    "barbershop",
    "dyrebutikk",
];

const MAX_REVIEW_SNIPPET_CHARS: usize = 120;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocalizedText {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaceReview {
    pub text: Option<LocalizedText>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    pub id: Option<String>,
    pub display_name: Option<LocalizedText>,
    pub formatted_address: Option<String>,
    pub rating: Option<f64>,
    pub user_rating_count: Option<u32>,
    #[serde(default)]
    pub types: Vec<String>,
    pub national_phone_number: Option<String>,
    pub website_uri: Option<String>,
    pub editorial_summary: Option<LocalizedText>,
    #[serde(default)]
    pub reviews: Vec<PlaceReview>,
    pub primary_type_display_name: Option<LocalizedText>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacesSearchResponse {
    #[serde(default)]
    pub places: Vec<Place>,
    pub next_page_token: Option<String>,
}

/// Absolute http(s) URL with a dotted host.
pub fn is_valid_website(value: Option<&str>) -> bool {
    let Some(trimmed) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return false;
    };
    match url::Url::parse(trimmed) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https")
                && parsed.host_str().is_some_and(|host| host.contains('.'))
        }
        Err(_) => false,
    }
}

pub fn guess_industry(types: &[String]) -> &'static str {
    types
        .iter()
        .find_map(|t| {
            PLACE_INDUSTRIES
                .iter()
                .find(|(place_type, _)| place_type == t)
                .map(|(_, industry)| *industry)
        })
        .unwrap_or("Other")
}

/// Two sentences of cold-call context: what the business is, then the
/// longest review snippet or a rating summary.
pub fn place_info(place: &Place, industry: &str, locale: &str) -> String {
    let editorial = place
        .editorial_summary
        .as_ref()
        .map(|s| s.text.trim())
        .filter(|s| !s.is_empty());
    let first = match editorial {
        Some(text) => text.trim_end_matches('.').to_string(),
        None => {
            let kind = place
                .primary_type_display_name
                .as_ref()
                .map(|t| t.text.trim())
                .filter(|t| !t.is_empty())
                .unwrap_or(industry);
            format!("{} i {}", kind, locale)
        }
    };

    let snippet = place
        .reviews
        .iter()
        .filter_map(|r| r.text.as_ref().map(|t| t.text.as_str()))
        .filter(|t| !t.is_empty())
        .fold("", |best, text| {
            if text.chars().count() > best.chars().count() {
                text
            } else {
                best
            }
        });

    let second = if !snippet.is_empty() {
        let snippet = if snippet.chars().count() > MAX_REVIEW_SNIPPET_CHARS {
            let cut: String = snippet.chars().take(MAX_REVIEW_SNIPPET_CHARS - 3).collect();
            format!("{}...", cut.trim_end())
        } else {
            snippet.to_string()
        };
        format!("\"{}\"", snippet)
    } else {
        match (place.rating, place.user_rating_count) {
            (Some(rating), Some(count)) if rating > 0.0 && count > 0 => {
                format!("Har {} stjerner basert på {} anmeldelser", rating, count)
            }
            _ => String::new(),
        }
    };

    if second.is_empty() {
        format!("{}.", first)
    } else {
        format!("{}. {}.", first, second)
    }
}

/// Builds a record from a Places result, or `None` when the place already
/// has a website, has no types or is a transit stop.
pub fn place_to_record(place: &Place, locale: &str, fallback_id: &str) -> Option<BusinessRecord> {
    if is_valid_website(place.website_uri.as_deref()) {
        return None;
    }
    if place.types.is_empty()
        || place
            .types
            .iter()
            .any(|t| EXCLUDED_PLACE_TYPES.contains(&t.as_str()))
    {
        return None;
    }

    let name = place
        .display_name
        .as_ref()
        .map(|n| n.text.trim())
        .filter(|n| !n.is_empty())
        .unwrap_or("Unknown");
    let id = place
        .id
        .as_deref()
        .filter(|id| !id.is_empty())
        .unwrap_or(fallback_id);
    let industry = guess_industry(&place.types);

    let mut record = BusinessRecord::new(
        id,
        BusinessIdentity::new(name, locale),
        LeadSource::PlacesApi,
    );
    record.address = place.formatted_address.clone().unwrap_or_default();
    record.industry = industry.to_string();
    record.phone = place
        .national_phone_number
        .as_deref()
        .and_then(normalize_no_phone);
    record.rating = place.rating;
    record.review_count = place.user_rating_count;
    record.info = place_info(place, industry, locale);
    Some(record)
}

// ============ Brønnøysund registry ============

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Described {
    #[serde(default)]
    pub kode: String,
    #[serde(default)]
    pub beskrivelse: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrregAddress {
    #[serde(default)]
    pub adresse: Vec<String>,
    pub postnummer: Option<String>,
    pub poststed: Option<String>,
    pub kommunenummer: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrregEntity {
    pub organisasjonsnummer: String,
    #[serde(default)]
    pub navn: String,
    pub organisasjonsform: Option<Described>,
    pub stiftelsesdato: Option<String>,
    pub registreringsdato_enhetsregisteret: Option<String>,
    pub naeringskode1: Option<Described>,
    pub telefon: Option<String>,
    pub mobil: Option<String>,
    pub epostadresse: Option<String>,
    pub hjemmeside: Option<String>,
    pub forretningsadresse: Option<BrregAddress>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrregEmbedded {
    #[serde(default)]
    pub enheter: Vec<BrregEntity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrregPageInfo {
    #[serde(default)]
    pub total_pages: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrregPage {
    #[serde(rename = "_embedded")]
    pub embedded: Option<BrregEmbedded>,
    pub page: Option<BrregPageInfo>,
}

impl BrregPage {
    pub fn entities(self) -> Vec<BrregEntity> {
        self.embedded.map(|e| e.enheter).unwrap_or_default()
    }

    pub fn total_pages(&self) -> u32 {
        self.page.as_ref().map(|p| p.total_pages).unwrap_or(1)
    }
}

/// "Street 1, 1384 ASKER".
pub fn format_address(address: &BrregAddress) -> String {
    let mut parts = Vec::new();
    let street = address
        .adresse
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    if !street.is_empty() {
        parts.push(street);
    }
    let postal = format!(
        "{} {}",
        address.postnummer.as_deref().unwrap_or(""),
        address.poststed.as_deref().unwrap_or("")
    )
    .trim()
    .to_string();
    if !postal.is_empty() {
        parts.push(postal);
    }
    parts.join(", ")
}

pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

/// ISO date in Norwegian `dd.mm.yyyy`; anything unparseable is returned as is.
pub fn format_date(value: &str) -> String {
    parse_iso_date(value)
        .map(|date| date.format("%d.%m.%Y").to_string())
        .unwrap_or_else(|| value.to_string())
}

pub fn registry_info(entity: &BrregEntity) -> String {
    let name = entity.navn.trim();
    let form = entity
        .organisasjonsform
        .as_ref()
        .map(|f| f.beskrivelse.trim().to_lowercase())
        .filter(|f| !f.is_empty());
    let founded = entity.stiftelsesdato.as_deref().filter(|d| !d.is_empty());

    let mut parts = vec![match (form, founded) {
        (Some(form), Some(founded)) => {
            format!("{} er et {} stiftet {}.", name, form, format_date(founded))
        }
        (Some(form), None) => format!("{} er et {}.", name, form),
        _ => format!("{} er en nyregistrert bedrift.", name),
    }];

    if let Some(nace) = entity
        .naeringskode1
        .as_ref()
        .filter(|n| !n.beskrivelse.is_empty())
    {
        if nace.kode.is_empty() {
            parts.push(format!(
                "Virksomheten driver med {}.",
                nace.beskrivelse.to_lowercase()
            ));
        } else {
            parts.push(format!(
                "Virksomheten driver med {} (NACE {}).",
                nace.beskrivelse.to_lowercase(),
                nace.kode
            ));
        }
    }

    if let Some(email) = non_blank(entity.epostadresse.as_deref()) {
        parts.push(format!("Kontakt: {}", email));
    }

    parts.join(" ")
}

/// Builds a record from a registry entity, or `None` when the entity has no
/// phone, mobile or email, or lists a homepage.
pub fn entity_to_record(entity: &BrregEntity, municipality: &str) -> Option<BusinessRecord> {
    let phone = non_blank(entity.telefon.as_deref()).or(non_blank(entity.mobil.as_deref()));
    let email = non_blank(entity.epostadresse.as_deref());
    if phone.is_none() && email.is_none() {
        return None;
    }
    if non_blank(entity.hjemmeside.as_deref()).is_some() {
        return None;
    }

    let mut identity = BusinessIdentity::new(entity.navn.trim(), municipality);
    if let Some(date) = entity
        .registreringsdato_enhetsregisteret
        .as_deref()
        .and_then(parse_iso_date)
    {
        identity = identity.with_registration_date(date);
    }
    if let Some(nace) = entity.naeringskode1.as_ref().filter(|n| !n.kode.is_empty()) {
        identity = identity.with_industry_code(nace.kode.clone());
    }

    let mut record = BusinessRecord::new(
        entity.organisasjonsnummer.trim(),
        identity,
        LeadSource::Registry,
    );
    record.address = entity
        .forretningsadresse
        .as_ref()
        .map(format_address)
        .unwrap_or_default();
    record.industry = entity
        .naeringskode1
        .as_ref()
        .map(|n| n.beskrivelse.clone())
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| "Annet".to_string());
    record.phone = phone.map(|p| normalize_no_phone(p).unwrap_or_else(|| p.to_string()));
    record.email = email.map(str::to_lowercase);
    record.notes = email.unwrap_or_default().to_string();
    record.info = registry_info(entity);
    Some(record)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Normalizes a Norwegian phone number to E.164 (+4741234567).
///
/// Numbers libphonenumber does not consider valid are kept as written, since
/// a human caller can still make sense of them.
pub fn normalize_no_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    match phonenumber::parse(Some(CountryId::NO), trimmed) {
        Ok(number) if phonenumber::is_valid(&number) => {
            Some(number.format().mode(Mode::E164).to_string())
        }
        Ok(_) => {
            tracing::warn!("Keeping unrecognized NO phone as written: {}", trimmed);
            Some(trimmed.to_string())
        }
        Err(e) => {
            tracing::warn!("Failed to parse NO phone '{}': {:?}", trimmed, e);
            Some(trimmed.to_string())
        }
    }
}
