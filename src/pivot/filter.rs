use super::EventRecord;
use chrono::NaiveDate;
use serde::Serialize;

const ALL_SENTINEL: &str = "all";

/// Restriction on one dimension. `"all"`, blank and absent all mean `Any`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "scope", content = "id")]
pub enum Scope {
    #[default]
    Any,
    Only(String),
}

impl Scope {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None => Self::Any,
            Some(s) if s.is_empty() || s.eq_ignore_ascii_case(ALL_SENTINEL) => Self::Any,
            Some(s) => Self::Only(s.to_string()),
        }
    }

    pub fn admits(&self, id: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Only(want) => want == id,
        }
    }

    pub fn as_id(&self) -> Option<&str> {
        match self {
            Self::Any => None,
            Self::Only(id) => Some(id.as_str()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    pub subject: Scope,
    pub class: Scope,
    /// Authenticated teacher. When set, only records of subjects this teacher
    /// teaches survive; there is no "all" for ownership.
    pub owner_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl FilterCriteria {
    pub fn admits(&self, record: &EventRecord) -> bool {
        if let Some(owner) = self.owner_id.as_deref() {
            if record.scope.owner_id != owner {
                return false;
            }
        }
        if !self.subject.admits(&record.scope.subject_id) {
            return false;
        }
        if !self.class.admits(&record.scope.class_id) {
            return false;
        }
        let date = record.event_key.date;
        if self.from.is_some_and(|from| date < from) {
            return false;
        }
        if self.to.is_some_and(|to| date > to) {
            return false;
        }
        true
    }
}

/// Narrows a fetched snapshot before it reaches aggregation.
pub fn filter_records(records: Vec<EventRecord>, criteria: &FilterCriteria) -> Vec<EventRecord> {
    records.into_iter().filter(|r| criteria.admits(r)).collect()
}
