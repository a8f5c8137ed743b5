//! Rule-based affiliation normalisation
//!
//! Submission forms carry affiliations as free text with inconsistent order,
//! casing and spelling. [`Affiliation::parse`] picks out the department,
//! faculty, university, city and country, and `Display` writes them back as
//! `Department of X, Faculty of Y, University, City, Country.`
//!
//! Matching works on lower-case words: parentheses, periods and hyphens become
//! spaces, and a few common misspellings are corrected first.

use crate::formatting::{capitalize_word, MINOR_WORDS};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Known cities: spelling, canonical name, country
const CITIES: &[(&str, &str, &str)] = &[
    ("kafr el sheikh", "Kafr El Sheikh", "Egypt"),
    ("new damietta", "Damietta", "Egypt"),
    ("new dameitta", "Damietta", "Egypt"),
    ("damietta", "Damietta", "Egypt"),
    ("damitta", "Damietta", "Egypt"),
    ("domitta", "Damietta", "Egypt"),
    ("dameitta", "Damietta", "Egypt"),
    ("cairo", "Cairo", "Egypt"),
    ("tanta", "Tanta", "Egypt"),
    ("alexandria", "Alexandria", "Egypt"),
    ("giza", "Giza", "Egypt"),
    ("mansoura", "Mansoura", "Egypt"),
];

const COUNTRIES: &[(&str, &str)] = &[("egypt", "Egypt")];

/// University spellings, matched anywhere in a part
const UNIVERSITIES: &[(&str, &str)] = &[
    ("alazhar", "Al-Azhar University"),
    ("al azhar", "Al-Azhar University"),
    ("al azher", "Al-Azhar University"),
    ("azhar", "Al-Azhar University"),
    ("azher", "Al-Azhar University"),
    ("cairo univ", "Cairo University"),
    ("mansoura univ", "Mansoura University"),
];

/// Faculty implied by a department name
const DEPARTMENT_FACULTIES: &[(&str, &str)] = &[
    ("psychology", "Faculty of Medicine"),
    ("comp sci", "Faculty of Engineering"),
    ("computer science", "Faculty of Engineering"),
    ("medicine", "Faculty of Medicine"),
    ("engineering", "Faculty of Engineering"),
    ("radiology", "Faculty of Medicine"),
    ("pediatric", "Faculty of Medicine"),
    ("neurosurgery", "Faculty of Medicine"),
];

const SPELLING: &[(&str, &str)] = &[
    ("deparmtent", "department"),
    ("facality", "faculty"),
    ("faclty", "faculty"),
    ("surgary", "surgery"),
    ("depridement", "surgery"),
];

const FACULTY_WORDS: &[&str] = &["faculty", "college", "school"];
const DEPARTMENT_WORDS: &[&str] = &["department", "dept"];
const ROLE_WORDS: &[&str] = &["lecturer", "professor", "assistant", "associate", "resident"];

static ROLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:assistant professor|associate professor|lecturer|professor|resident) of ([a-z]+)")
        .expect("valid role regex")
});
static NON_WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9&' ]+").expect("valid non-word regex"));

/// Components of one affiliation, lower-case until displayed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Affiliation {
    /// Department name without the `Department of` prefix
    pub department: Option<String>,
    /// Faculty, college or school
    pub faculty: Option<String>,
    /// University or centre
    pub university: Option<String>,
    /// City
    pub city: Option<String>,
    /// Country
    pub country: Option<String>,
}

impl Affiliation {
    /// Extract the components of a free-text affiliation
    ///
    /// Returns `None` when nothing could be recognised.
    #[must_use = "returns the parsed affiliation"]
    pub fn parse(raw: &str) -> Option<Self> {
        let parts: Vec<Vec<String>> = raw
            .split([',', ';', '\n'])
            .map(normalize_words)
            .filter(|words| !words.is_empty())
            .collect();
        if parts.is_empty() {
            return None;
        }

        let department = department(&parts);
        let faculty = faculty(&parts).or_else(|| {
            let dept = department.as_deref()?;
            DEPARTMENT_FACULTIES
                .iter()
                .find(|(key, _)| dept.contains(key))
                .map(|(_, faculty)| faculty.to_lowercase())
        });
        let university = university(&parts);
        let country = parts.iter().find_map(|words| {
            let joined = words.join(" ");
            COUNTRIES.iter().find(|(spelling, _)| *spelling == joined).map(|(_, name)| name.to_lowercase())
        });

        let found: Vec<&str> = [&department, &faculty, &university, &country]
            .into_iter()
            .filter_map(|s| s.as_deref())
            .collect();
        let city = parts.iter().find_map(|words| find_city(words).map(|(_, name, _)| name.to_lowercase())).or_else(|| {
            parts
                .iter()
                .map(|words| words.join(" "))
                .find(|part| is_place_name(part) && !found.iter().any(|f| f.contains(part.as_str()) || part.contains(f)))
        });
        let country = country.or_else(|| {
            let city = city.as_deref()?;
            CITIES
                .iter()
                .find(|(_, name, _)| name.eq_ignore_ascii_case(city))
                .map(|(_, _, country)| country.to_lowercase())
        });

        let affiliation = Self {
            department,
            faculty,
            university,
            city,
            country,
        };
        (affiliation != Self::default()).then_some(affiliation)
    }
}

impl fmt::Display for Affiliation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut clauses: Vec<String> = Vec::new();
        let department = self.department.as_ref().map(|d| format!("department of {d}"));
        let fields = [&department, &self.faculty, &self.university, &self.city, &self.country];
        for clause in fields.into_iter().flatten() {
            let cased = clause_case(clause);
            if !clauses.iter().any(|c| c.eq_ignore_ascii_case(&cased)) {
                clauses.push(cased);
            }
        }
        write!(f, "{}.", clauses.join(", "))
    }
}

/// Normalise a free-text affiliation, or `None` if nothing was recognised
///
/// ```
/// use manudoc_core::affiliation::normalize_affiliation;
///
/// assert_eq!(
///     normalize_affiliation("Department of Radiology").as_deref(),
///     Some("Department of Radiology, Faculty of Medicine.")
/// );
/// ```
#[must_use = "returns the normalised affiliation"]
pub fn normalize_affiliation(raw: &str) -> Option<String> {
    Affiliation::parse(raw).map(|a| a.to_string())
}

/// Lower-case words of one part with spelling corrections applied
fn normalize_words(part: &str) -> Vec<String> {
    let lower = part.to_lowercase().replace(['(', ')', '.', '-'], " ");
    NON_WORD_RE
        .replace_all(&lower, " ")
        .split_whitespace()
        .map(|word| {
            SPELLING
                .iter()
                .find(|(wrong, _)| *wrong == word)
                .map_or_else(|| word.to_string(), |(_, right)| (*right).to_string())
        })
        .collect()
}

/// City spelled at the start of `words`
fn city_at(words: &[String]) -> Option<&'static (&'static str, &'static str, &'static str)> {
    CITIES.iter().find(|(spelling, _, _)| {
        let city: Vec<&str> = spelling.split(' ').collect();
        words.len() >= city.len() && words.iter().zip(&city).all(|(w, c)| w.as_str() == *c)
    })
}

fn find_city(words: &[String]) -> Option<&'static (&'static str, &'static str, &'static str)> {
    (0..words.len()).find_map(|i| city_at(&words[i..]))
}

fn is_faculty_word(word: &str) -> bool {
    FACULTY_WORDS.contains(&word)
}

fn is_university_word(word: &str) -> bool {
    word.starts_with("univ")
}

fn has_keyword(part: &str) -> bool {
    part.split(' ').any(|w| {
        is_faculty_word(w)
            || DEPARTMENT_WORDS.contains(&w)
            || is_university_word(w)
            || w == "center"
            || w == "centre"
    })
}

fn matches_university_alias(part: &str) -> bool {
    UNIVERSITIES.iter().any(|(alias, _)| part.contains(alias))
}

/// A short part naming a place no table knows about
fn is_place_name(part: &str) -> bool {
    let words = part.split(' ').count();
    words <= 3
        && part.chars().all(|c| c.is_alphabetic() || c == ' ')
        && !has_keyword(part)
        && !matches_university_alias(part)
        && !COUNTRIES.iter().any(|(spelling, _)| *spelling == part)
}

/// Words following `start` up to the next faculty, department, university or city word
fn words_until_stop(words: &[String], start: usize) -> Vec<&str> {
    let mut out = Vec::new();
    for (i, word) in words.iter().enumerate().skip(start) {
        if is_faculty_word(word)
            || DEPARTMENT_WORDS.contains(&word.as_str())
            || is_university_word(word)
            || city_at(&words[i..]).is_some()
        {
            break;
        }
        out.push(word.as_str());
    }
    out
}

fn department(parts: &[Vec<String>]) -> Option<String> {
    for words in parts {
        let joined = words.join(" ");
        if let Some(caps) = ROLE_RE.captures(&joined) {
            return Some(caps[1].to_string());
        }

        let Some(i) = words.iter().position(|w| DEPARTMENT_WORDS.contains(&w.as_str())) else {
            continue;
        };
        let name = if words.get(i + 1).is_some_and(|w| w == "of") {
            words_until_stop(words, i + 2)
        } else {
            words[..i].iter().map(String::as_str).filter(|w| !ROLE_WORDS.contains(w)).collect()
        };
        if !name.is_empty() {
            return Some(name.join(" "));
        }
    }

    for words in parts {
        if let Some(i) = words.iter().position(|w| w == "center" || w == "centre") {
            if let Some(name) = i.checked_sub(1).map(|j| &words[j]) {
                if city_at(&words[i - 1..]).is_none() {
                    return Some(name.clone());
                }
            }
        }
    }

    let first = &parts[0];
    let joined = first.join(" ");
    if let Some(i) = first.iter().position(|w| is_faculty_word(w)) {
        let lead = &first[..i];
        let plausible = (1..=3).contains(&lead.len())
            && !lead.iter().any(|w| ROLE_WORDS.contains(&w.as_str()))
            && find_city(lead).is_none()
            && !matches_university_alias(&lead.join(" "));
        return plausible.then(|| lead.join(" "));
    }
    let plain = !has_keyword(&joined)
        && find_city(first).is_none()
        && !matches_university_alias(&joined)
        && !COUNTRIES.iter().any(|(spelling, _)| *spelling == joined)
        && first.iter().any(|w| w.chars().any(char::is_alphabetic));
    plain.then_some(joined)
}

fn faculty(parts: &[Vec<String>]) -> Option<String> {
    for words in parts {
        let Some(i) = words.iter().position(|w| is_faculty_word(w)) else {
            continue;
        };
        if words.get(i + 1).is_some_and(|w| w == "of") {
            if let Some(subject) = words.get(i + 2) {
                return Some(format!("{} of {subject}", words[i]));
            }
        }
        let mut name = vec![words[i].as_str()];
        name.extend(words_until_stop(words, i + 1));
        return Some(name.join(" "));
    }
    None
}

fn university(parts: &[Vec<String>]) -> Option<String> {
    for words in parts {
        let joined = words.join(" ");
        if let Some((_, name)) = UNIVERSITIES.iter().find(|(alias, _)| joined.contains(alias)) {
            return Some(name.to_lowercase());
        }
        if words.iter().any(|w| w == "center" || w == "centre") {
            return Some(joined);
        }
        let Some(k) = words.iter().position(|w| is_university_word(w)) else {
            continue;
        };

        let mut start = k;
        while start > 0 && k - start < 3 {
            let prev = &words[start - 1];
            let before_prev = start.checked_sub(2).map(|j| words[j].as_str());
            if is_faculty_word(prev)
                || DEPARTMENT_WORDS.contains(&prev.as_str())
                || ROLE_WORDS.contains(&prev.as_str())
                || prev == "of"
                || before_prev == Some("of")
            {
                break;
            }
            start -= 1;
        }
        let mut name: Vec<&str> = words[start..k].iter().map(String::as_str).collect();
        name.push("university");
        if words.get(k + 1).is_some_and(|w| w == "of") {
            if let Some(place) = words.get(k + 2) {
                name.extend(["of", place.as_str()]);
            }
        }
        return Some(name.join(" "));
    }
    None
}

/// Title case one clause; hyphenated words are capitalised per segment
fn clause_case(clause: &str) -> String {
    clause
        .split_whitespace()
        .enumerate()
        .map(|(i, word)| {
            let lower = word.to_lowercase();
            if i > 0 && MINOR_WORDS.contains(&lower.as_str()) {
                lower
            } else {
                lower.split('-').map(capitalize_word).collect::<Vec<_>>().join("-")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized(raw: &str) -> String {
        normalize_affiliation(raw).unwrap_or_default()
    }

    #[test]
    fn test_full_affiliation_reordered() {
        assert_eq!(
            normalized("Dept of Comp Sci, Faculty of Engineering, Cairo Univ, Egypt"),
            "Department of Comp Sci, Faculty of Engineering, Cairo University, Cairo, Egypt."
        );
    }

    #[test]
    fn test_misspelled_city_and_university() {
        assert_eq!(
            normalized("Orthopedic surgery , faculty of medicine,al-azhar university damitta"),
            "Department of Orthopedic Surgery, Faculty of Medicine, Al-Azhar University, Damietta, Egypt."
        );
    }

    #[test]
    fn test_role_prefix_gives_department() {
        assert_eq!(
            normalized("lecturer of otorhinolaryngolgy,al azhar faculty of medicine new dameitta"),
            "Department of Otorhinolaryngolgy, Faculty of Medicine, Al-Azhar University, Damietta, Egypt."
        );
    }

    #[test]
    fn test_center_is_institution() {
        assert_eq!(
            normalized("Kafr El Sheikh Ophthalmology Center"),
            "Department of Ophthalmology, Kafr El Sheikh Ophthalmology Center, Kafr El Sheikh, Egypt."
        );
    }

    #[test]
    fn test_faculty_inferred_from_department() {
        assert_eq!(normalized("Department of Radiology"), "Department of Radiology, Faculty of Medicine.");
    }

    #[test]
    fn test_unknown_city_kept() {
        let affiliation = Affiliation::parse("Faculty of Medicine, Menoufia University, Shebin El Kom").unwrap();
        assert_eq!(affiliation.department, None);
        assert_eq!(affiliation.university.as_deref(), Some("menoufia university"));
        assert_eq!(affiliation.city.as_deref(), Some("shebin el kom"));
        assert_eq!(affiliation.country, None);
    }

    #[test]
    fn test_nothing_recognised() {
        assert_eq!(normalize_affiliation(""), None);
        assert_eq!(normalize_affiliation(" ?? , -- "), None);
    }

    #[test]
    fn test_equivalent_spellings_agree() {
        assert_eq!(
            normalized("department of comp sci , faculty of engineering, cairo university, egypt"),
            normalized("Dept. of Comp Sci, Faculty of Engineering, Cairo Univ, Egypt")
        );
    }
}
