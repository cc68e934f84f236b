//! Workout activity kinds.
//!
//! The table follows the native activity code space: codes `1..=80` are the
//! known kinds, everything else (including the native "other" code `3000`)
//! lands in [`ActivityType::Other`] and serializes as `"other"`.

use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Native code used by the platform for "other".
pub const OTHER_CODE: u32 = 3000;

const EXPORT_PREFIX: &str = "HKWorkoutActivityType";

macro_rules! activity_types {
    ($($variant:ident = $code:literal => $ident:literal,)*) => {
        /// A workout activity kind.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ActivityType {
            $($variant,)*
            /// Any code outside the known table; keeps the raw code.
            Other(u32),
        }

        /// Every known kind with its native code and wire identifier, in code order.
        pub const KNOWN: &[(ActivityType, u32, &str)] = &[
            $((ActivityType::$variant, $code, $ident),)*
        ];

        impl ActivityType {
            /// Map a native code. Never fails.
            pub const fn from_code(code: u32) -> Self {
                match code {
                    $($code => Self::$variant,)*
                    other => Self::Other(other),
                }
            }

            pub const fn code(self) -> u32 {
                match self {
                    $(Self::$variant => $code,)*
                    Self::Other(code) => code,
                }
            }

            /// The lowerCamelCase wire identifier.
            pub const fn identifier(self) -> &'static str {
                match self {
                    $(Self::$variant => $ident,)*
                    Self::Other(_) => "other",
                }
            }
        }
    };
}

activity_types! {
    AmericanFootball = 1 => "americanFootball",
    Archery = 2 => "archery",
    AustralianFootball = 3 => "australianFootball",
    Badminton = 4 => "badminton",
    Baseball = 5 => "baseball",
    Basketball = 6 => "basketball",
    Bowling = 7 => "bowling",
    Boxing = 8 => "boxing",
    Climbing = 9 => "climbing",
    Cricket = 10 => "cricket",
    CrossTraining = 11 => "crossTraining",
    Curling = 12 => "curling",
    Cycling = 13 => "cycling",
    Dance = 14 => "dance",
    DanceInspiredTraining = 15 => "danceInspiredTraining",
    Elliptical = 16 => "elliptical",
    EquestrianSports = 17 => "equestrianSports",
    Fencing = 18 => "fencing",
    Fishing = 19 => "fishing",
    FunctionalStrengthTraining = 20 => "functionalStrengthTraining",
    Golf = 21 => "golf",
    Gymnastics = 22 => "gymnastics",
    Handball = 23 => "handball",
    Hiking = 24 => "hiking",
    Hockey = 25 => "hockey",
    Hunting = 26 => "hunting",
    Lacrosse = 27 => "lacrosse",
    MartialArts = 28 => "martialArts",
    MindAndBody = 29 => "mindAndBody",
    MixedMetabolicCardioTraining = 30 => "mixedMetabolicCardioTraining",
    PaddleSports = 31 => "paddleSports",
    Play = 32 => "play",
    PreparationAndRecovery = 33 => "preparationAndRecovery",
    Racquetball = 34 => "racquetball",
    Rowing = 35 => "rowing",
    Rugby = 36 => "rugby",
    Running = 37 => "running",
    Sailing = 38 => "sailing",
    SkatingSports = 39 => "skatingSports",
    SnowSports = 40 => "snowSports",
    Soccer = 41 => "soccer",
    Softball = 42 => "softball",
    Squash = 43 => "squash",
    StairClimbing = 44 => "stairClimbing",
    SurfingSports = 45 => "surfingSports",
    Swimming = 46 => "swimming",
    TableTennis = 47 => "tableTennis",
    Tennis = 48 => "tennis",
    TrackAndField = 49 => "trackAndField",
    TraditionalStrengthTraining = 50 => "traditionalStrengthTraining",
    Volleyball = 51 => "volleyball",
    Walking = 52 => "walking",
    WaterFitness = 53 => "waterFitness",
    WaterPolo = 54 => "waterPolo",
    WaterSports = 55 => "waterSports",
    Wrestling = 56 => "wrestling",
    Yoga = 57 => "yoga",
    Barre = 58 => "barre",
    CoreTraining = 59 => "coreTraining",
    CrossCountrySkiing = 60 => "crossCountrySkiing",
    DownhillSkiing = 61 => "downhillSkiing",
    Flexibility = 62 => "flexibility",
    HighIntensityIntervalTraining = 63 => "highIntensityIntervalTraining",
    JumpRope = 64 => "jumpRope",
    Kickboxing = 65 => "kickboxing",
    Pilates = 66 => "pilates",
    Snowboarding = 67 => "snowboarding",
    Stairs = 68 => "stairs",
    StepTraining = 69 => "stepTraining",
    WheelchairWalkPace = 70 => "wheelchairWalkPace",
    WheelchairRunPace = 71 => "wheelchairRunPace",
    TaiChi = 72 => "taiChi",
    MixedCardio = 73 => "mixedCardio",
    HandCycling = 74 => "handCycling",
    DiscSports = 75 => "discSports",
    FitnessGaming = 76 => "fitnessGaming",
    CardioDance = 77 => "cardioDance",
    SocialDance = 78 => "socialDance",
    Pickleball = 79 => "pickleball",
    Cooldown = 80 => "cooldown",
}

static BY_IDENTIFIER: Lazy<HashMap<&'static str, ActivityType>> =
    Lazy::new(|| KNOWN.iter().map(|&(kind, _, ident)| (ident, kind)).collect());

impl ActivityType {
    /// Look up a wire identifier (`"running"`) or an export name
    /// (`"HKWorkoutActivityTypeRunning"`). Unknown names become `Other(OTHER_CODE)`.
    pub fn from_identifier(name: &str) -> Self {
        let ident = match name.strip_prefix(EXPORT_PREFIX) {
            Some(rest) => lower_first(rest),
            None => name.to_string(),
        };

        BY_IDENTIFIER
            .get(ident.as_str())
            .copied()
            .unwrap_or(Self::Other(OTHER_CODE))
    }

    pub const fn is_other(self) -> bool {
        matches!(self, Self::Other(_))
    }
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

impl Serialize for ActivityType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.identifier())
    }
}

impl<'de> Deserialize<'de> for ActivityType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_identifier(&s))
    }
}
