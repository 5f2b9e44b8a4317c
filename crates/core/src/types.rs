use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single property value attached to an event. Mirrors the value types
/// analytics backends accept as event properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Number(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Number(value as f64)
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        PropertyValue::Number(f64::from(value))
    }
}

impl From<u64> for PropertyValue {
    fn from(value: u64) -> Self {
        PropertyValue::Number(value as f64)
    }
}

/// Event properties, ordered by key so payloads are stable.
pub type Properties = BTreeMap<String, PropertyValue>;

/// Build a property bag from key/value pairs.
pub fn props<K, V, I>(pairs: I) -> Properties
where
    K: Into<String>,
    V: Into<PropertyValue>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Canonical event envelope handed to a sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub properties: Properties,
}

impl Event {
    pub fn new(name: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            timestamp,
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Merge caller supplied properties. Caller values win over envelope tags.
    pub fn with_properties(mut self, properties: Option<Properties>) -> Self {
        if let Some(properties) = properties {
            self.properties.extend(properties);
        }
        self
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }
}

/// Value of a remotely configured feature flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Enabled(bool),
    Variant(String),
}

/// Checkpoints of the intended visitor journey, tracked once per page load.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStage {
    PageView,
    HeroView,
    #[serde(rename = "problem_section_view")]
    ProblemSectionView,
    HowItWorksView,
    #[serde(rename = "courses_section_view")]
    CoursesView,
    #[serde(rename = "results_section_view")]
    ResultsView,
    #[serde(rename = "pricing_section_view")]
    PricingView,
    FooterView,
}

impl FunnelStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunnelStage::PageView => "page_view",
            FunnelStage::HeroView => "hero_view",
            FunnelStage::ProblemSectionView => "problem_section_view",
            FunnelStage::HowItWorksView => "how_it_works_view",
            FunnelStage::CoursesView => "courses_section_view",
            FunnelStage::ResultsView => "results_section_view",
            FunnelStage::PricingView => "pricing_section_view",
            FunnelStage::FooterView => "footer_view",
        }
    }
}

/// Actions that count as a conversion (CTA clicks, contact links).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConversionEvent {
    BookCallClick,
    DownloadCatalogClick,
    ViewSyllabusClick,
    ScheduleDemoClick,
    EmailClick,
    PhoneClick,
    SocialClick,
}

impl ConversionEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionEvent::BookCallClick => "book_call_click",
            ConversionEvent::DownloadCatalogClick => "download_catalog_click",
            ConversionEvent::ViewSyllabusClick => "view_syllabus_click",
            ConversionEvent::ScheduleDemoClick => "schedule_demo_click",
            ConversionEvent::EmailClick => "email_click",
            ConversionEvent::PhoneClick => "phone_click",
            ConversionEvent::SocialClick => "social_click",
        }
    }
}

/// Non-converting UI interactions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InteractionEvent {
    DarkModeToggle,
    MobileMenuOpen,
    NavigationClick,
    CourseCardHover,
    TestimonialRead,
    PricingExpand,
}

impl InteractionEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionEvent::DarkModeToggle => "dark_mode_toggle",
            InteractionEvent::MobileMenuOpen => "mobile_menu_open",
            InteractionEvent::NavigationClick => "navigation_click",
            InteractionEvent::CourseCardHover => "course_card_hover",
            InteractionEvent::TestimonialRead => "testimonial_read",
            InteractionEvent::PricingExpand => "pricing_expand",
        }
    }
}

impl fmt::Display for FunnelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ConversionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for InteractionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
