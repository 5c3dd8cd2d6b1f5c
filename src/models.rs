use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_SUBJECT_CHARS: usize = 200;

// Supported industries. The wire names are fixed by the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Industry {
    #[serde(rename = "e-commerce")]
    ECommerce,
    #[serde(rename = "SaaS")]
    Saas,
    #[serde(rename = "retail")]
    Retail,
    #[serde(rename = "healthcare")]
    Healthcare,
    #[serde(rename = "finance")]
    Finance,
    #[serde(rename = "education")]
    Education,
    #[serde(rename = "technology")]
    Technology,
    #[serde(rename = "real-estate")]
    RealEstate,
    #[serde(rename = "automotive")]
    Automotive,
    #[serde(rename = "food-beverage")]
    FoodBeverage,
}

impl Industry {
    pub const ALL: [Industry; 10] = [
        Industry::ECommerce,
        Industry::Saas,
        Industry::Retail,
        Industry::Healthcare,
        Industry::Finance,
        Industry::Education,
        Industry::Technology,
        Industry::RealEstate,
        Industry::Automotive,
        Industry::FoodBeverage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Industry::ECommerce => "e-commerce",
            Industry::Saas => "SaaS",
            Industry::Retail => "retail",
            Industry::Healthcare => "healthcare",
            Industry::Finance => "finance",
            Industry::Education => "education",
            Industry::Technology => "technology",
            Industry::RealEstate => "real-estate",
            Industry::Automotive => "automotive",
            Industry::FoodBeverage => "food-beverage",
        }
    }

    pub fn parse(value: &str) -> Option<Industry> {
        Industry::ALL.into_iter().find(|i| i.as_str() == value)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Industry::ECommerce => "E-commerce",
            Industry::Saas => "SaaS",
            Industry::Retail => "Retail",
            Industry::Healthcare => "Healthcare",
            Industry::Finance => "Finance",
            Industry::Education => "Education",
            Industry::Technology => "Technology",
            Industry::RealEstate => "Real Estate",
            Industry::Automotive => "Automotive",
            Industry::FoodBeverage => "Food & Beverage",
        }
    }

    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Industry::ECommerce => &[
                "sale", "discount", "offer", "deal", "save", "buy", "shop", "cart", "checkout",
            ],
            Industry::Saas => &[
                "free", "trial", "demo", "upgrade", "feature", "productivity", "efficiency",
                "automation",
            ],
            Industry::Retail => &[
                "new", "trending", "popular", "bestseller", "exclusive", "limited", "collection",
            ],
            Industry::Healthcare => &[
                "health", "wellness", "care", "treatment", "doctor", "medical",
            ],
            Industry::Finance => &[
                "investment", "savings", "loan", "credit", "financial", "money", "wealth",
            ],
            Industry::Education => &[
                "learn", "course", "training", "skill", "education", "knowledge", "study",
            ],
            Industry::Technology => &[
                "innovation", "digital", "tech", "software", "hardware", "solution",
            ],
            Industry::RealEstate => &[
                "property", "home", "house", "apartment", "investment", "market",
            ],
            Industry::Automotive => &[
                "car", "vehicle", "auto", "drive", "transportation", "mobility",
            ],
            Industry::FoodBeverage => &[
                "food", "restaurant", "dining", "taste", "flavor", "recipe", "cooking",
            ],
        }
    }
}

impl fmt::Display for Industry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Raw request body. Fields stay loosely typed so every problem can be
// reported at once instead of failing on the first serde error.
#[derive(Deserialize, Debug, Default)]
pub struct RawAnalyzeRequest {
    pub subject: Option<serde_json::Value>,
    pub industry: Option<serde_json::Value>,
}

// Validated request
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeRequest {
    pub subject: String,
    pub industry: Industry,
}

impl AnalyzeRequest {
    /// Parses and validates a JSON body. On failure returns one message per
    /// problem found.
    pub fn from_json(body: &[u8]) -> Result<Self, Vec<String>> {
        let raw: RawAnalyzeRequest = serde_json::from_slice(body)
            .map_err(|e| vec![format!("body: invalid JSON ({e})")])?;

        let mut details = Vec::new();

        let subject = match raw.subject {
            Some(serde_json::Value::String(s)) => {
                let len = s.chars().count();
                if len == 0 {
                    details.push("subject: Subject line is required".to_string());
                } else if len > MAX_SUBJECT_CHARS {
                    details.push("subject: Subject line too long".to_string());
                }
                Some(s)
            }
            Some(_) => {
                details.push("subject: expected a string".to_string());
                None
            }
            None => {
                details.push("subject: Subject line is required".to_string());
                None
            }
        };

        let industry = match raw.industry.as_ref().and_then(|v| v.as_str()).and_then(Industry::parse) {
            Some(industry) => Some(industry),
            None => {
                let accepted: Vec<&str> = Industry::ALL.iter().map(|i| i.as_str()).collect();
                details.push(format!("industry: Industry must be one of: {}", accepted.join(", ")));
                None
            }
        };

        match (subject, industry) {
            (Some(subject), Some(industry)) if details.is_empty() => Ok(Self { subject, industry }),
            _ => Err(details),
        }
    }
}

// What gets computed (and cached) for a subject line. The echoed
// `original` is not part of it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub score: u8,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub ai_insights: String,
}

// API response format
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AnalyzeResponse {
    pub original: String,
    pub score: u8,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub ai_insights: String,
}

impl AnalyzeResponse {
    pub fn new(original: String, result: AnalysisResult) -> Self {
        Self {
            original,
            score: result.score,
            issues: result.issues,
            suggestions: result.suggestions,
            ai_insights: result.ai_insights,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_industry_wire_names_roundtrip_through_parse() {
        for industry in Industry::ALL {
            assert_eq!(Industry::parse(industry.as_str()), Some(industry));
            let json = serde_json::to_string(&industry).unwrap();
            assert_eq!(json, format!("\"{}\"", industry.as_str()));
        }
        assert_eq!(Industry::parse("saas"), None);
    }

    #[test]
    fn test_valid_request() {
        let req = AnalyzeRequest::from_json(br#"{"subject":"Hi there","industry":"SaaS"}"#).unwrap();
        assert_eq!(req.subject, "Hi there");
        assert_eq!(req.industry, Industry::Saas);
    }

    #[test]
    fn test_empty_subject_rejected() {
        let err = AnalyzeRequest::from_json(br#"{"subject":"","industry":"retail"}"#).unwrap_err();
        assert_eq!(err, vec!["subject: Subject line is required".to_string()]);
    }

    #[test]
    fn test_subject_length_counts_characters() {
        let ok = "é".repeat(200);
        let body = serde_json::json!({"subject": ok, "industry": "retail"}).to_string();
        assert!(AnalyzeRequest::from_json(body.as_bytes()).is_ok());

        let too_long = "a".repeat(201);
        let body = serde_json::json!({"subject": too_long, "industry": "retail"}).to_string();
        let err = AnalyzeRequest::from_json(body.as_bytes()).unwrap_err();
        assert_eq!(err, vec!["subject: Subject line too long".to_string()]);
    }

    #[test]
    fn test_reports_all_problems() {
        let err = AnalyzeRequest::from_json(br#"{"subject":42,"industry":"space"}"#).unwrap_err();
        assert_eq!(err.len(), 2);
        assert!(err[1].starts_with("industry: Industry must be one of: e-commerce, SaaS"));
    }

    #[test]
    fn test_malformed_json() {
        let err = AnalyzeRequest::from_json(b"{not json").unwrap_err();
        assert!(err[0].starts_with("body: invalid JSON"));
    }
}
