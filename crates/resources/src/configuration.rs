//! Folder Configurations
//!
//! A resource variant carries a tuple of qualifiers (`values-fr-rCA`,
//! `drawable-land-xhdpi-v21`). The same tuple describes the runtime
//! configuration of the previewed device; [`best_match`] picks the variant a
//! device would load.

use std::fmt;
use serde::{Deserialize, Serialize};

/// Qualifier axes in Android precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Mcc,
    Mnc,
    Locale,
    LayoutDirection,
    SmallestWidth,
    Width,
    Height,
    ScreenSize,
    Orientation,
    UiMode,
    NightMode,
    Density,
    Touchscreen,
    Keyboard,
    Version,
}

const AXES: [Axis; 15] = [
    Axis::Mcc,
    Axis::Mnc,
    Axis::Locale,
    Axis::LayoutDirection,
    Axis::SmallestWidth,
    Axis::Width,
    Axis::Height,
    Axis::ScreenSize,
    Axis::Orientation,
    Axis::UiMode,
    Axis::NightMode,
    Axis::Density,
    Axis::Touchscreen,
    Axis::Keyboard,
    Axis::Version,
];

/// Language with an optional region
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocaleQualifier {
    /// ISO 639 language code, lowercase
    pub language: String,
    /// ISO 3166 region (uppercase) or UN M.49 area code
    pub region: Option<String>,
}

impl LocaleQualifier {
    pub fn new(language: impl Into<String>, region: Option<&str>) -> Self {
        Self {
            language: language.into().to_ascii_lowercase(),
            region: region.map(|r| r.to_ascii_uppercase()),
        }
    }
}

/// Mobile network code, remembering how many digits the folder name used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkCode {
    pub value: u16,
    pub digits: u8,
}

impl NetworkCode {
    fn parse(digits: &str) -> Option<Self> {
        if !(1..=3).contains(&digits.len()) {
            return None;
        }
        let value = parse_digits(digits).and_then(|v| u16::try_from(v).ok())?;
        Some(Self {
            value,
            digits: digits.len() as u8,
        })
    }
}

impl fmt::Display for NetworkCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$}", self.value, width = usize::from(self.digits))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LayoutDirection {
    Ltr,
    Rtl,
}

/// Screen size bucket; a resource for a smaller bucket also fits larger screens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScreenSize {
    Small,
    Normal,
    Large,
    XLarge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Orientation {
    Portrait,
    Landscape,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UiMode {
    Car,
    Desk,
    Television,
    Appliance,
    Watch,
    VrHeadset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NightMode {
    NotNight,
    Night,
}

/// Screen density
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Density {
    /// Density in dots per inch (`mdpi` = 160)
    Dpi(u32),
    /// Bitmaps that must not be scaled
    NoDpi,
    /// Density independent (vector) resources
    AnyDpi,
}

impl Density {
    pub const LOW: Density = Density::Dpi(120);
    pub const MEDIUM: Density = Density::Dpi(160);
    pub const TV: Density = Density::Dpi(213);
    pub const HIGH: Density = Density::Dpi(240);
    pub const XHIGH: Density = Density::Dpi(320);
    pub const XXHIGH: Density = Density::Dpi(480);
    pub const XXXHIGH: Density = Density::Dpi(640);

    fn parse(token: &str) -> Option<Self> {
        let density = match token {
            "ldpi" => Self::LOW,
            "mdpi" => Self::MEDIUM,
            "tvdpi" => Self::TV,
            "hdpi" => Self::HIGH,
            "xhdpi" => Self::XHIGH,
            "xxhdpi" => Self::XXHIGH,
            "xxxhdpi" => Self::XXXHIGH,
            "nodpi" => Density::NoDpi,
            "anydpi" => Density::AnyDpi,
            other => {
                let digits = other.strip_suffix("dpi")?;
                Density::Dpi(parse_digits(digits)?)
            }
        };
        Some(density)
    }

    fn qualifier(&self) -> String {
        match *self {
            Density::NoDpi => "nodpi".to_string(),
            Density::AnyDpi => "anydpi".to_string(),
            Density::Dpi(120) => "ldpi".to_string(),
            Density::Dpi(160) => "mdpi".to_string(),
            Density::Dpi(213) => "tvdpi".to_string(),
            Density::Dpi(240) => "hdpi".to_string(),
            Density::Dpi(320) => "xhdpi".to_string(),
            Density::Dpi(480) => "xxhdpi".to_string(),
            Density::Dpi(640) => "xxxhdpi".to_string(),
            Density::Dpi(dpi) => format!("{}dpi", dpi),
        }
    }

    /// Rank of this density for a device, lower is better
    fn rank_for(&self, device_dpi: u32) -> (u8, u32) {
        match *self {
            Density::AnyDpi => (0, 0),
            Density::Dpi(dpi) if dpi == device_dpi => (1, 0),
            Density::Dpi(dpi) if dpi > device_dpi => (2, dpi - device_dpi),
            Density::Dpi(dpi) => (3, device_dpi - dpi),
            Density::NoDpi => (4, 0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Touchscreen {
    NoTouch,
    Stylus,
    Finger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyboardState {
    Exposed,
    Hidden,
    Soft,
}

/// Ordered qualifier tuple of a resource variant or of a device
///
/// An unset axis on a resource means "any"; an unset axis on a device means
/// the device has no value for it, so only resources leaving it unset match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FolderConfiguration {
    pub mcc: Option<u16>,
    pub mnc: Option<NetworkCode>,
    pub locale: Option<LocaleQualifier>,
    pub layout_direction: Option<LayoutDirection>,
    pub smallest_width_dp: Option<u32>,
    pub width_dp: Option<u32>,
    pub height_dp: Option<u32>,
    pub screen_size: Option<ScreenSize>,
    pub orientation: Option<Orientation>,
    pub ui_mode: Option<UiMode>,
    pub night_mode: Option<NightMode>,
    pub density: Option<Density>,
    pub touchscreen: Option<Touchscreen>,
    pub keyboard: Option<KeyboardState>,
    pub api_level: Option<u32>,
}

/// The configuration of the previewed device
pub type RuntimeConfig = FolderConfiguration;

impl FolderConfiguration {
    /// Configuration without any qualifier
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a dash separated qualifier list (`fr-rCA-land-v21`)
    ///
    /// Qualifiers must appear in Android precedence order. Returns `None` for
    /// unknown or out of order qualifiers.
    pub fn from_qualifiers(qualifiers: &str) -> Option<Self> {
        let mut config = Self::default();
        if qualifiers.is_empty() {
            return Some(config);
        }

        let tokens: Vec<String> = qualifiers.split('-').map(|t| t.to_string()).collect();
        let mut next_axis = 0;
        let mut i = 0;

        while i < tokens.len() {
            let token = tokens[i].to_ascii_lowercase();
            let mut matched = false;

            for (axis_index, axis) in AXES.iter().enumerate().skip(next_axis) {
                let consumed = config.parse_axis(*axis, &token, tokens.get(i + 1).map(|s| s.as_str()));
                if consumed > 0 {
                    next_axis = axis_index + 1;
                    i += consumed;
                    matched = true;
                    break;
                }
            }

            if !matched {
                return None;
            }
        }

        Some(config)
    }

    /// Try to set `axis` from `token`; returns how many tokens were consumed
    fn parse_axis(&mut self, axis: Axis, token: &str, next: Option<&str>) -> usize {
        match axis {
            Axis::Mcc => {
                self.mcc = token.strip_prefix("mcc").and_then(parse_digits).and_then(|v| u16::try_from(v).ok());
                usize::from(self.mcc.is_some())
            }
            Axis::Mnc => {
                self.mnc = token.strip_prefix("mnc").and_then(NetworkCode::parse);
                usize::from(self.mnc.is_some())
            }
            Axis::Locale => {
                if let Some(tag) = token.strip_prefix("b+") {
                    return match parse_bcp47(tag) {
                        Some(locale) => {
                            self.locale = Some(locale);
                            1
                        }
                        None => 0,
                    };
                }
                if !is_language(token) {
                    return 0;
                }
                let region = next
                    .and_then(|n| n.strip_prefix('r').or_else(|| n.strip_prefix('R')))
                    .filter(|r| is_region(r));
                self.locale = Some(LocaleQualifier::new(token, region));
                if region.is_some() { 2 } else { 1 }
            }
            Axis::LayoutDirection => {
                self.layout_direction = match token {
                    "ldltr" => Some(LayoutDirection::Ltr),
                    "ldrtl" => Some(LayoutDirection::Rtl),
                    _ => None,
                };
                usize::from(self.layout_direction.is_some())
            }
            Axis::SmallestWidth => {
                self.smallest_width_dp = token.strip_prefix("sw").and_then(parse_dp);
                usize::from(self.smallest_width_dp.is_some())
            }
            Axis::Width => {
                self.width_dp = token.strip_prefix('w').and_then(parse_dp);
                usize::from(self.width_dp.is_some())
            }
            Axis::Height => {
                self.height_dp = token.strip_prefix('h').and_then(parse_dp);
                usize::from(self.height_dp.is_some())
            }
            Axis::ScreenSize => {
                self.screen_size = match token {
                    "small" => Some(ScreenSize::Small),
                    "normal" => Some(ScreenSize::Normal),
                    "large" => Some(ScreenSize::Large),
                    "xlarge" => Some(ScreenSize::XLarge),
                    _ => None,
                };
                usize::from(self.screen_size.is_some())
            }
            Axis::Orientation => {
                self.orientation = match token {
                    "port" => Some(Orientation::Portrait),
                    "land" => Some(Orientation::Landscape),
                    "square" => Some(Orientation::Square),
                    _ => None,
                };
                usize::from(self.orientation.is_some())
            }
            Axis::UiMode => {
                self.ui_mode = match token {
                    "car" => Some(UiMode::Car),
                    "desk" => Some(UiMode::Desk),
                    "television" => Some(UiMode::Television),
                    "appliance" => Some(UiMode::Appliance),
                    "watch" => Some(UiMode::Watch),
                    "vrheadset" => Some(UiMode::VrHeadset),
                    _ => None,
                };
                usize::from(self.ui_mode.is_some())
            }
            Axis::NightMode => {
                self.night_mode = match token {
                    "night" => Some(NightMode::Night),
                    "notnight" => Some(NightMode::NotNight),
                    _ => None,
                };
                usize::from(self.night_mode.is_some())
            }
            Axis::Density => {
                self.density = Density::parse(token);
                usize::from(self.density.is_some())
            }
            Axis::Touchscreen => {
                self.touchscreen = match token {
                    "notouch" => Some(Touchscreen::NoTouch),
                    "stylus" => Some(Touchscreen::Stylus),
                    "finger" => Some(Touchscreen::Finger),
                    _ => None,
                };
                usize::from(self.touchscreen.is_some())
            }
            Axis::Keyboard => {
                self.keyboard = match token {
                    "keysexposed" => Some(KeyboardState::Exposed),
                    "keyshidden" => Some(KeyboardState::Hidden),
                    "keyssoft" => Some(KeyboardState::Soft),
                    _ => None,
                };
                usize::from(self.keyboard.is_some())
            }
            Axis::Version => {
                self.api_level = token.strip_prefix('v').and_then(parse_digits);
                usize::from(self.api_level.is_some())
            }
        }
    }

    /// Whether no qualifier is set
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Number of qualifier axes that are set
    pub fn qualifier_count(&self) -> usize {
        AXES.iter().filter(|axis| self.is_set(**axis)).count()
    }

    fn is_set(&self, axis: Axis) -> bool {
        match axis {
            Axis::Mcc => self.mcc.is_some(),
            Axis::Mnc => self.mnc.is_some(),
            Axis::Locale => self.locale.is_some(),
            Axis::LayoutDirection => self.layout_direction.is_some(),
            Axis::SmallestWidth => self.smallest_width_dp.is_some(),
            Axis::Width => self.width_dp.is_some(),
            Axis::Height => self.height_dp.is_some(),
            Axis::ScreenSize => self.screen_size.is_some(),
            Axis::Orientation => self.orientation.is_some(),
            Axis::UiMode => self.ui_mode.is_some(),
            Axis::NightMode => self.night_mode.is_some(),
            Axis::Density => self.density.is_some(),
            Axis::Touchscreen => self.touchscreen.is_some(),
            Axis::Keyboard => self.keyboard.is_some(),
            Axis::Version => self.api_level.is_some(),
        }
    }

    /// Whether a resource with this configuration can be used on `device`
    pub fn is_match_for(&self, device: &RuntimeConfig) -> bool {
        fn same<T: PartialEq>(resource: &Option<T>, device: &Option<T>) -> bool {
            resource.is_none() || resource == device
        }
        fn at_most<T: PartialOrd>(resource: &Option<T>, device: &Option<T>) -> bool {
            match (resource, device) {
                (None, _) => true,
                (Some(r), Some(d)) => r <= d,
                (Some(_), None) => false,
            }
        }

        let locale_matches = match (&self.locale, &device.locale) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(r), Some(d)) => {
                r.language == d.language && (r.region.is_none() || r.region == d.region)
            }
        };

        same(&self.mcc, &device.mcc)
            && same(&self.mnc.map(|m| m.value), &device.mnc.map(|m| m.value))
            && locale_matches
            && same(&self.layout_direction, &device.layout_direction)
            && at_most(&self.smallest_width_dp, &device.smallest_width_dp)
            && at_most(&self.width_dp, &device.width_dp)
            && at_most(&self.height_dp, &device.height_dp)
            && at_most(&self.screen_size, &device.screen_size)
            && same(&self.orientation, &device.orientation)
            && same(&self.ui_mode, &device.ui_mode)
            && same(&self.night_mode, &device.night_mode)
            && same(&self.touchscreen, &device.touchscreen)
            && same(&self.keyboard, &device.keyboard)
            && at_most(&self.api_level, &device.api_level)
    }

    pub fn with_locale(mut self, language: &str, region: Option<&str>) -> Self {
        self.locale = Some(LocaleQualifier::new(language, region));
        self
    }

    pub fn with_density(mut self, density: Density) -> Self {
        self.density = Some(density);
        self
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = Some(orientation);
        self
    }

    pub fn with_night_mode(mut self, night_mode: NightMode) -> Self {
        self.night_mode = Some(night_mode);
        self
    }

    pub fn with_smallest_width(mut self, dp: u32) -> Self {
        self.smallest_width_dp = Some(dp);
        self
    }

    pub fn with_api_level(mut self, api_level: u32) -> Self {
        self.api_level = Some(api_level);
        self
    }
}

impl fmt::Display for FolderConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();

        if let Some(mcc) = self.mcc {
            parts.push(format!("mcc{}", mcc));
        }
        if let Some(mnc) = self.mnc {
            parts.push(format!("mnc{}", mnc));
        }
        if let Some(locale) = &self.locale {
            parts.push(locale.language.clone());
            if let Some(region) = &locale.region {
                parts.push(format!("r{}", region));
            }
        }
        if let Some(direction) = self.layout_direction {
            parts.push(match direction {
                LayoutDirection::Ltr => "ldltr".to_string(),
                LayoutDirection::Rtl => "ldrtl".to_string(),
            });
        }
        if let Some(dp) = self.smallest_width_dp {
            parts.push(format!("sw{}dp", dp));
        }
        if let Some(dp) = self.width_dp {
            parts.push(format!("w{}dp", dp));
        }
        if let Some(dp) = self.height_dp {
            parts.push(format!("h{}dp", dp));
        }
        if let Some(size) = self.screen_size {
            parts.push(match size {
                ScreenSize::Small => "small",
                ScreenSize::Normal => "normal",
                ScreenSize::Large => "large",
                ScreenSize::XLarge => "xlarge",
            }.to_string());
        }
        if let Some(orientation) = self.orientation {
            parts.push(match orientation {
                Orientation::Portrait => "port",
                Orientation::Landscape => "land",
                Orientation::Square => "square",
            }.to_string());
        }
        if let Some(mode) = self.ui_mode {
            parts.push(match mode {
                UiMode::Car => "car",
                UiMode::Desk => "desk",
                UiMode::Television => "television",
                UiMode::Appliance => "appliance",
                UiMode::Watch => "watch",
                UiMode::VrHeadset => "vrheadset",
            }.to_string());
        }
        if let Some(night) = self.night_mode {
            parts.push(match night {
                NightMode::Night => "night",
                NightMode::NotNight => "notnight",
            }.to_string());
        }
        if let Some(density) = self.density {
            parts.push(density.qualifier());
        }
        if let Some(touch) = self.touchscreen {
            parts.push(match touch {
                Touchscreen::NoTouch => "notouch",
                Touchscreen::Stylus => "stylus",
                Touchscreen::Finger => "finger",
            }.to_string());
        }
        if let Some(keyboard) = self.keyboard {
            parts.push(match keyboard {
                KeyboardState::Exposed => "keysexposed",
                KeyboardState::Hidden => "keyshidden",
                KeyboardState::Soft => "keyssoft",
            }.to_string());
        }
        if let Some(api) = self.api_level {
            parts.push(format!("v{}", api));
        }

        f.write_str(&parts.join("-"))
    }
}

impl From<FolderConfiguration> for String {
    fn from(config: FolderConfiguration) -> Self {
        config.to_string()
    }
}

impl TryFrom<String> for FolderConfiguration {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        FolderConfiguration::from_qualifiers(&value)
            .ok_or_else(|| format!("invalid qualifier string '{}'", value))
    }
}

/// Pick the variant a device with configuration `device` would use
///
/// Variants contradicting the device are dropped first. Then, axis by axis in
/// precedence order, if any remaining variant sets the axis only the variants
/// with the best value for it survive. Returns `None` when no variant is
/// compatible with the device.
pub fn best_match<'a, T, F>(device: &RuntimeConfig, variants: &'a [T], config_of: F) -> Option<&'a T>
where
    F: Fn(&T) -> &FolderConfiguration,
{
    let mut candidates: Vec<&'a T> = variants
        .iter()
        .filter(|v| config_of(v).is_match_for(device))
        .collect();

    for axis in AXES {
        if candidates.len() <= 1 {
            break;
        }
        if !candidates.iter().any(|c| config_of(c).is_set(axis)) {
            continue;
        }

        match axis {
            Axis::Locale => {
                candidates.retain(|c| config_of(c).locale.is_some());
                if candidates
                    .iter()
                    .any(|c| config_of(c).locale.as_ref().is_some_and(|l| l.region.is_some()))
                {
                    candidates.retain(|c| {
                        config_of(c).locale.as_ref().is_some_and(|l| l.region.is_some())
                    });
                }
            }
            Axis::Density => {
                let device_dpi = match device.density {
                    Some(Density::Dpi(dpi)) => dpi,
                    _ => 160,
                };
                let effective = |c: &T| config_of(c).density.unwrap_or(Density::MEDIUM);
                if let Some(best) = candidates
                    .iter()
                    .map(|c| effective(c).rank_for(device_dpi))
                    .min()
                {
                    candidates.retain(|c| effective(c).rank_for(device_dpi) == best);
                }
            }
            Axis::SmallestWidth => keep_largest(&mut candidates, |c| config_of(c).smallest_width_dp),
            Axis::Width => keep_largest(&mut candidates, |c| config_of(c).width_dp),
            Axis::Height => keep_largest(&mut candidates, |c| config_of(c).height_dp),
            Axis::ScreenSize => keep_largest(&mut candidates, |c| config_of(c).screen_size),
            Axis::Version => keep_largest(&mut candidates, |c| config_of(c).api_level),
            _ => candidates.retain(|c| config_of(c).is_set(axis)),
        }
    }

    candidates.first().copied()
}

fn keep_largest<T, V: Ord + Copy>(candidates: &mut Vec<&T>, value: impl Fn(&T) -> Option<V>) {
    if let Some(max) = candidates.iter().filter_map(|c| value(c)).max() {
        candidates.retain(|c| value(c) == Some(max));
    }
}

fn parse_digits(s: &str) -> Option<u32> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn parse_dp(s: &str) -> Option<u32> {
    s.strip_suffix("dp").and_then(parse_digits)
}

fn is_language(token: &str) -> bool {
    (2..=3).contains(&token.len())
        && token.chars().all(|c| c.is_ascii_alphabetic())
        // "car" is a UI mode, not a language
        && token != "car"
}

fn is_region(token: &str) -> bool {
    (token.len() == 2 && token.chars().all(|c| c.is_ascii_alphabetic()))
        || (token.len() == 3 && token.chars().all(|c| c.is_ascii_digit()))
}

/// `b+sr+Latn+RS` style tag; the script subtag is not tracked
fn parse_bcp47(tag: &str) -> Option<LocaleQualifier> {
    let mut subtags = tag.split('+');
    let language = subtags.next().filter(|l| (2..=3).contains(&l.len()))?;
    let region = subtags.find(|s| is_region(s));
    Some(LocaleQualifier::new(language, region))
}
