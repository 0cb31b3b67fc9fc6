//! Search filter vocabularies.
//!
//! Each filter maps to a fixed token understood by the jobs-search endpoint.
//! The enums make an out-of-vocabulary value unrepresentable once a query is
//! constructed; string inputs go through `FromStr`/serde and fail there.
//! Multi-valued filters accept a single value or a list and normalize to a
//! list before URL building.

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use serde::de;
use serde::{Deserialize, Serialize};

macro_rules! filter_enum {
    ($(#[$doc:meta])* $name:ident { $($variant:ident => $token:literal),+ $(,)? }) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $token)] $variant,)+
        }

        impl $name {
            /// Wire token appended to the search URL.
            pub fn as_param(&self) -> &'static str {
                match self {
                    $(Self::$variant => $token,)+
                }
            }

            pub const ALL: &'static [$name] = &[$(Self::$variant,)+];
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_param())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($token => Ok(Self::$variant),)+
                    other => Err(format!(
                        concat!(stringify!($name), " must be one of {}, got \"{}\""),
                        Self::ALL.iter().map(|v| v.as_param()).collect::<Vec<_>>().join(", "),
                        other,
                    )),
                }
            }
        }
    };
}

filter_enum!(
    /// Result ordering.
    Relevance {
        Relevant => "R",
        Recent => "DD",
    }
);

filter_enum!(
    /// Posting age window, expressed in seconds.
    TimeRange {
        Day => "r86400",
        Week => "r604800",
        Month => "r2592000",
    }
);

filter_enum!(
    /// Minimum base salary band.
    BaseSalary {
        Salary40K => "1",
        Salary60K => "2",
        Salary80K => "3",
        Salary100K => "4",
        Salary120K => "5",
        Salary140K => "6",
        Salary160K => "7",
        Salary180K => "8",
        Salary200K => "9",
    }
);

filter_enum!(
    /// Employment type.
    JobType {
        FullTime => "F",
        PartTime => "P",
        Temporary => "T",
        Contract => "C",
        Internship => "I",
        Volunteer => "V",
        Other => "O",
    }
);

filter_enum!(
    /// Seniority.
    ExperienceLevel {
        Internship => "1",
        EntryLevel => "2",
        Associate => "3",
        MidSenior => "4",
        Director => "5",
        Executive => "6",
    }
);

filter_enum!(
    /// Work arrangement.
    OnSiteOrRemote {
        OnSite => "1",
        Remote => "2",
        Hybrid => "3",
    }
);

filter_enum!(
    /// Industry, by the site's numeric id.
    Industry {
        AirlinesAviation => "94",
        Banking => "41",
        CivilEngineering => "51",
        ComputerGames => "109",
        EnvironmentalServices => "86",
        ElectronicManufacturing => "112",
        FinancialServices => "43",
        InformationServices => "84",
        InvestmentBanking => "45",
        InvestmentManagement => "46",
        ItServices => "96",
        LegalServices => "10",
        MotorVehicles => "53",
        OilGas => "59",
        SoftwareDevelopment => "4",
        StaffingRecruiting => "104",
        TechnologyInternet => "6",
    }
);

/// A single value or a list; always read back as a list.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

/// Tokens go through `FromStr` instead of an untagged enum so that a
/// rejected value reports the vocabulary it failed against, not serde's
/// generic "did not match any variant".
impl<'de, T> Deserialize<'de> for OneOrMany<T>
where
    T: FromStr<Err = String>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct TokenVisitor<T>(PhantomData<T>);

        impl<'de, T> de::Visitor<'de> for TokenVisitor<T>
        where
            T: FromStr<Err = String>,
        {
            type Value = OneOrMany<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a filter token or a list of filter tokens")
            }

            fn visit_str<E: de::Error>(self, token: &str) -> Result<Self::Value, E> {
                token.parse().map(OneOrMany::One).map_err(E::custom)
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut values = Vec::new();
                while let Some(token) = seq.next_element::<String>()? {
                    values.push(token.parse().map_err(de::Error::custom)?);
                }
                Ok(OneOrMany::Many(values))
            }
        }

        deserializer.deserialize_any(TokenVisitor(PhantomData))
    }
}

impl<T: Copy> OneOrMany<T> {
    pub fn to_vec(&self) -> Vec<T> {
        match self {
            Self::One(v) => vec![*v],
            Self::Many(vs) => vs.clone(),
        }
    }
}

impl<T> From<T> for OneOrMany<T> {
    fn from(v: T) -> Self {
        Self::One(v)
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(vs: Vec<T>) -> Self {
        Self::Many(vs)
    }
}

/// The full filter set attached to one query. Every field is optional and
/// absent fields contribute nothing to the search URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Filters {
    /// A company jobs-search URL carrying an `f_C` company id parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_jobs_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<Relevance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<TimeRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_salary: Option<BaseSalary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<OneOrMany<JobType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience: Option<OneOrMany<ExperienceLevel>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_site_or_remote: Option<OneOrMany<OnSiteOrRemote>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<OneOrMany<Industry>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tokens_round_trip_through_from_str() {
        for t in JobType::ALL {
            assert_eq!(t.as_param().parse::<JobType>().unwrap(), *t);
        }
        for e in ExperienceLevel::ALL {
            assert_eq!(e.as_param().parse::<ExperienceLevel>().unwrap(), *e);
        }
    }

    #[test]
    fn unknown_token_is_rejected_with_the_vocabulary() {
        let err = "X".parse::<Relevance>().unwrap_err();
        assert!(err.contains("R, DD"), "{err}");
        assert!(err.contains("\"X\""), "{err}");
    }

    #[test]
    fn single_value_normalizes_to_list() {
        let one: OneOrMany<JobType> = JobType::FullTime.into();
        assert_eq!(one.to_vec(), vec![JobType::FullTime]);

        let many: OneOrMany<JobType> = vec![JobType::FullTime, JobType::Contract].into();
        assert_eq!(many.to_vec(), vec![JobType::FullTime, JobType::Contract]);
    }

    #[test]
    fn serde_accepts_single_or_list_and_rejects_unknown() {
        let f: Filters = serde_json::from_str(r#"{"type": "F"}"#).unwrap();
        assert_eq!(f.r#type.unwrap().to_vec(), vec![JobType::FullTime]);

        let f: Filters = serde_json::from_str(r#"{"type": ["F", "C"]}"#).unwrap();
        assert_eq!(
            f.r#type.unwrap().to_vec(),
            vec![JobType::FullTime, JobType::Contract]
        );

        assert!(serde_json::from_str::<Filters>(r#"{"type": "Z"}"#).is_err());
    }

    #[test]
    fn deserialization_errors_carry_the_vocabulary() {
        let err = serde_json::from_str::<Filters>(r#"{"type": "Z"}"#).unwrap_err();
        assert!(
            err.to_string()
                .contains("JobType must be one of F, P, T, C, I, V, O"),
            "{err}"
        );

        // A bad element inside a list is reported the same way.
        let err = serde_json::from_str::<Filters>(r#"{"experience": ["4", "9"]}"#).unwrap_err();
        assert!(
            err.to_string().contains("ExperienceLevel must be one of"),
            "{err}"
        );
    }
}
