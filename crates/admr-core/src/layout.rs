//! Loudspeaker layout model
//!
//! A `Layout` is an ordered list of channels with nominal and real polar
//! positions, per-channel allowed ranges from BS.2051, and LFE flags. Real
//! listening rooms are described by a `RealLayout` (a set of `Speaker`s plus
//! an optional screen), which is merged into a standard layout with
//! `Layout::with_real_layout`.

use std::io::Read;

use ndarray::Array2;
use serde::Deserialize;

use crate::error::{CoreError, CoreResult};
use crate::geom::{inside_angle_range, Vec3};
use crate::position::{
    CartesianPosition, CartesianScreen, PolarPosition, PolarScreen, Screen,
};

/// One channel of a reproduction layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    /// BS.2051 channel name, e.g. `M+030`
    pub name: String,
    /// Real speaker location
    pub polar_position: PolarPosition,
    /// Nominal speaker location from BS.2051
    pub polar_nominal_position: PolarPosition,
    /// Allowed azimuth range, anticlockwise from `.0` to `.1`
    pub az_range: (f64, f64),
    /// Allowed elevation range, upwards from `.0` to `.1`
    pub el_range: (f64, f64),
    /// Is this an LFE channel?
    pub is_lfe: bool,
}

impl Channel {
    /// A channel whose nominal position, real position and allowed ranges all
    /// collapse to one point.
    pub fn fixed(name: &str, azimuth: f64, elevation: f64, is_lfe: bool) -> Self {
        let position = PolarPosition::new(azimuth, elevation, 1.0);
        Self {
            name: name.to_owned(),
            polar_position: position,
            polar_nominal_position: position,
            az_range: (azimuth, azimuth),
            el_range: (elevation, elevation),
            is_lfe,
        }
    }

    /// Real position as a Cartesian vector.
    pub fn position(&self) -> Vec3 {
        self.polar_position.as_cartesian()
    }

    /// Real direction on the unit sphere.
    pub fn norm_position(&self) -> Vec3 {
        self.polar_position.norm_position()
    }

    /// Nominal position as a Cartesian vector.
    pub fn nominal_position(&self) -> Vec3 {
        self.polar_nominal_position.as_cartesian()
    }

    /// Check that the real position is within the allowed ranges.
    pub fn check_position(&self) -> CoreResult<()> {
        if !inside_angle_range(
            self.polar_position.azimuth,
            self.az_range.0,
            self.az_range.1,
            0.0,
        ) {
            return Err(CoreError::PositionOutOfRange {
                channel: self.name.clone(),
                coordinate: "azimuth",
                value: self.polar_position.azimuth,
                min: self.az_range.0,
                max: self.az_range.1,
            });
        }

        if !(self.el_range.0 <= self.polar_position.elevation
            && self.polar_position.elevation <= self.el_range.1)
        {
            return Err(CoreError::PositionOutOfRange {
                channel: self.name.clone(),
                coordinate: "elevation",
                value: self.polar_position.elevation,
                min: self.el_range.0,
                max: self.el_range.1,
            });
        }

        Ok(())
    }
}

/// A loudspeaker layout: a name, channels, and optional screen information.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub name: String,
    pub channels: Vec<Channel>,
    /// Screen to use for screen-related content; `None` disables
    /// screen-related processing.
    pub screen: Option<Screen>,
}

impl Layout {
    pub fn new(name: &str, channels: Vec<Channel>) -> Self {
        Self {
            name: name.to_owned(),
            channels,
            screen: Some(Screen::default_screen()),
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// The same layout without LFE channels.
    pub fn without_lfe(&self) -> Layout {
        Layout {
            name: self.name.clone(),
            channels: self
                .channels
                .iter()
                .filter(|c| !c.is_lfe)
                .cloned()
                .collect(),
            screen: self.screen,
        }
    }

    /// Per-channel LFE flags.
    pub fn is_lfe(&self) -> Vec<bool> {
        self.channels.iter().map(|c| c.is_lfe).collect()
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.name == name)
    }

    /// Real channel positions.
    pub fn positions(&self) -> Vec<Vec3> {
        self.channels.iter().map(|c| c.position()).collect()
    }

    /// Real channel directions on the unit sphere.
    pub fn norm_positions(&self) -> Vec<Vec3> {
        self.channels.iter().map(|c| c.norm_position()).collect()
    }

    /// Nominal channel positions.
    pub fn nominal_positions(&self) -> Vec<Vec3> {
        self.channels.iter().map(|c| c.nominal_position()).collect()
    }

    /// Check that all real positions are within the allowed BS.2051 ranges.
    pub fn check_positions(&self) -> CoreResult<()> {
        for channel in &self.channels {
            channel.check_position()?;
        }
        Ok(())
    }

    /// Remap speaker positions to those in `speakers`, producing an upmix
    /// matrix from layout channels to output channel numbers.
    ///
    /// The matrix may be missing entries or have duplicates depending on the
    /// speaker list; use `check_upmix_matrix`.
    pub fn with_speakers(&self, speakers: &[Speaker]) -> CoreResult<(Layout, Array2<f64>)> {
        let out_channels = speakers
            .iter()
            .map(|s| s.channel)
            .max()
            .ok_or_else(|| CoreError::SpeakersFile("no speakers given".into()))?
            + 1;

        let mut upmix = Array2::<f64>::zeros((out_channels, self.channels.len()));
        let mut new_channels = Vec::with_capacity(self.channels.len());

        for (i, channel) in self.channels.iter().enumerate() {
            let mut channel = channel.clone();

            if let Some(speaker) = speakers
                .iter()
                .find(|s| s.names.iter().any(|n| n == &channel.name))
            {
                upmix[[speaker.channel, i]] = speaker.gain_linear;
                if let Some(position) = speaker.polar_position {
                    channel.polar_position = position;
                }
            }

            new_channels.push(channel);
        }

        Ok((
            Layout {
                name: self.name.clone(),
                channels: new_channels,
                screen: self.screen,
            },
            upmix,
        ))
    }

    /// Incorporate information from a real layout; see `with_speakers`.
    pub fn with_real_layout(&self, real_layout: &RealLayout) -> CoreResult<(Layout, Array2<f64>)> {
        let (mut layout, upmix) = match &real_layout.speakers {
            Some(speakers) => self.with_speakers(speakers)?,
            None => (self.clone(), Array2::eye(self.channels.len())),
        };

        layout.screen = real_layout.screen;
        Ok((layout, upmix))
    }

    /// Check an upmix matrix: each layout channel must map to exactly one
    /// output, and each output must come from at most one channel.
    pub fn check_upmix_matrix(&self, upmix: &Array2<f64>) -> CoreResult<()> {
        for (i, channel) in self.channels.iter().enumerate() {
            let outputs: Vec<usize> = (0..upmix.nrows())
                .filter(|&r| upmix[[r, i]] != 0.0)
                .collect();
            if outputs.is_empty() {
                return Err(CoreError::SpeakersFile(format!(
                    "channel {} not mapped to any output",
                    channel.name
                )));
            }
            if outputs.len() > 1 {
                return Err(CoreError::SpeakersFile(format!(
                    "channel {} mapped to multiple outputs: {:?}",
                    channel.name, outputs
                )));
            }
        }

        for r in 0..upmix.nrows() {
            let channels: Vec<&str> = self
                .channels
                .iter()
                .enumerate()
                .filter(|(i, _)| upmix[[r, *i]] != 0.0)
                .map(|(_, c)| c.name.as_str())
                .collect();
            if channels.len() > 1 {
                return Err(CoreError::SpeakersFile(format!(
                    "speaker idx {} used by multiple channels: {:?}",
                    r, channels
                )));
            }
        }

        Ok(())
    }
}

/// A real-world loudspeaker.
#[derive(Debug, Clone, PartialEq)]
pub struct Speaker {
    /// 0-based output channel number
    pub channel: usize,
    /// BS.2051 channel names this speaker should handle
    pub names: Vec<String>,
    /// Real position, if known
    pub polar_position: Option<PolarPosition>,
    /// Linear gain to apply to this output channel
    pub gain_linear: f64,
}

/// A complete listening environment onto which a standard layout is mapped.
#[derive(Debug, Clone, PartialEq)]
pub struct RealLayout {
    pub speakers: Option<Vec<Speaker>>,
    pub screen: Option<Screen>,
}

// serde representation of the speakers file; see the README for the format

#[derive(Deserialize)]
#[serde(untagged)]
enum SpeakersFile {
    List(Vec<SpeakerEntry>),
    Full {
        speakers: Option<Vec<SpeakerEntry>>,
        #[serde(default = "default_screen_entry")]
        screen: Option<ScreenEntry>,
    },
}

fn default_screen_entry() -> Option<ScreenEntry> {
    Some(ScreenEntry::Default)
}

#[derive(Deserialize)]
struct SpeakerEntry {
    channel: usize,
    names: Names,
    position: Option<PolarPositionEntry>,
    gain_linear: Option<f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Names {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
struct PolarPositionEntry {
    az: f64,
    el: f64,
    r: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScreenEntry {
    #[serde(skip)]
    Default,
    Tagged(ScreenEntryTagged),
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ScreenEntryTagged {
    #[serde(rename = "polar")]
    Polar {
        #[serde(rename = "aspectRatio")]
        aspect_ratio: f64,
        #[serde(rename = "centrePosition")]
        centre_position: PolarPositionEntry,
        #[serde(rename = "widthAzimuth")]
        width_azimuth: f64,
    },
    #[serde(rename = "cart")]
    Cart {
        #[serde(rename = "aspectRatio")]
        aspect_ratio: f64,
        #[serde(rename = "centrePosition")]
        centre_position: CartPositionEntry,
        #[serde(rename = "widthX")]
        width_x: f64,
    },
}

#[derive(Deserialize)]
struct CartPositionEntry {
    #[serde(rename = "X")]
    x: f64,
    #[serde(rename = "Y")]
    y: f64,
    #[serde(rename = "Z")]
    z: f64,
}

/// Load a real layout from a speakers file.
///
/// The file is either a list of speaker objects, or an object with optional
/// `speakers` and `screen` keys. If the screen is omitted the default screen
/// is used; if it is specified but null, screen-related processing is
/// disabled.
pub fn load_real_layout(reader: impl Read) -> CoreResult<RealLayout> {
    let parsed: SpeakersFile = serde_json::from_reader(reader)
        .map_err(|e| CoreError::SpeakersFile(e.to_string()))?;

    let (entries, screen_entry) = match parsed {
        SpeakersFile::List(entries) => (Some(entries), Some(ScreenEntry::Default)),
        SpeakersFile::Full { speakers, screen } => (speakers, screen),
    };

    let speakers = entries
        .map(|entries| entries.into_iter().map(speaker_from_entry).collect())
        .transpose()?;

    let screen = match screen_entry {
        None => None,
        Some(ScreenEntry::Default) => Some(Screen::default_screen()),
        Some(ScreenEntry::Tagged(ScreenEntryTagged::Polar {
            aspect_ratio,
            centre_position,
            width_azimuth,
        })) => Some(Screen::Polar(PolarScreen {
            aspect_ratio,
            centre_position: PolarPosition::new(
                centre_position.az,
                centre_position.el,
                centre_position.r,
            ),
            width_azimuth,
        })),
        Some(ScreenEntry::Tagged(ScreenEntryTagged::Cart {
            aspect_ratio,
            centre_position,
            width_x,
        })) => Some(Screen::Cart(CartesianScreen {
            aspect_ratio,
            centre_position: CartesianPosition::new(
                centre_position.x,
                centre_position.y,
                centre_position.z,
            ),
            width_x,
        })),
    };

    Ok(RealLayout { speakers, screen })
}

fn speaker_from_entry(entry: SpeakerEntry) -> CoreResult<Speaker> {
    let names = match entry.names {
        Names::One(name) => vec![name],
        Names::Many(names) => names,
    };

    let polar_position = entry
        .position
        .map(|p| {
            let position = PolarPosition::new(p.az, p.el, p.r);
            position.validate().map(|_| position)
        })
        .transpose()
        .map_err(|e| CoreError::SpeakersFile(e.to_string()))?;

    Ok(Speaker {
        channel: entry.channel,
        names,
        polar_position,
        gain_linear: entry.gain_linear.unwrap_or(1.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bs2051;

    #[test]
    fn test_without_lfe() {
        let layout = bs2051::get_layout("0+5+0").unwrap();
        assert_eq!(layout.num_channels(), 6);
        let no_lfe = layout.without_lfe();
        assert_eq!(no_lfe.num_channels(), 5);
        assert!(no_lfe.channels.iter().all(|c| !c.is_lfe));
    }

    #[test]
    fn test_check_positions() {
        let mut layout = bs2051::get_layout("0+5+0").unwrap();
        assert!(layout.check_positions().is_ok());

        let i = layout.channel_index("M+030").unwrap();
        layout.channels[i].polar_position = PolarPosition::new(30.0, 10.0, 1.0);
        assert!(layout.check_positions().is_err());
    }

    #[test]
    fn test_with_speakers() {
        let layout = bs2051::get_layout("0+2+0").unwrap();

        let speakers = vec![
            Speaker {
                channel: 1,
                names: vec!["M+030".into()],
                polar_position: Some(PolarPosition::new(25.0, 0.0, 1.5)),
                gain_linear: 0.5,
            },
            Speaker {
                channel: 0,
                names: vec!["M-030".into()],
                polar_position: None,
                gain_linear: 1.0,
            },
        ];

        let (new_layout, upmix) = layout.with_speakers(&speakers).unwrap();
        assert_eq!(
            new_layout.channels[0].polar_position,
            PolarPosition::new(25.0, 0.0, 1.5)
        );
        assert_eq!(upmix[[1, 0]], 0.5);
        assert_eq!(upmix[[0, 1]], 1.0);
        assert!(layout.check_upmix_matrix(&upmix).is_ok());
    }

    #[test]
    fn test_check_upmix_matrix_errors() {
        let layout = bs2051::get_layout("0+2+0").unwrap();

        // both channels routed to the same output
        let speakers = vec![
            Speaker {
                channel: 0,
                names: vec!["M+030".into(), "M-030".into()],
                polar_position: None,
                gain_linear: 1.0,
            },
        ];
        let (_, upmix) = layout.with_speakers(&speakers).unwrap();
        assert!(layout.check_upmix_matrix(&upmix).is_err());
    }

    #[test]
    fn test_load_real_layout_list() {
        let json = r#"[
            {"channel": 0, "names": "M+030"},
            {"channel": 1, "names": ["M-030"], "position": {"az": -25.0, "el": 0.0, "r": 1.5},
             "gain_linear": 0.5}
        ]"#;

        let real = load_real_layout(json.as_bytes()).unwrap();
        let speakers = real.speakers.unwrap();
        assert_eq!(speakers.len(), 2);
        assert_eq!(speakers[0].names, vec!["M+030"]);
        assert_eq!(speakers[1].gain_linear, 0.5);
        assert_eq!(
            speakers[1].polar_position,
            Some(PolarPosition::new(-25.0, 0.0, 1.5))
        );
        // screen omitted: default screen
        assert_eq!(real.screen, Some(Screen::default_screen()));
    }

    #[test]
    fn test_load_real_layout_screen() {
        let json = r#"{
            "speakers": [{"channel": 0, "names": "M+000"}],
            "screen": {"type": "polar", "aspectRatio": 1.6,
                       "centrePosition": {"az": 10.0, "el": 0.0, "r": 1.0},
                       "widthAzimuth": 30.0}
        }"#;

        let real = load_real_layout(json.as_bytes()).unwrap();
        match real.screen {
            Some(Screen::Polar(s)) => {
                assert_eq!(s.aspect_ratio, 1.6);
                assert_eq!(s.width_azimuth, 30.0);
            }
            other => panic!("unexpected screen: {:?}", other),
        }
    }

    #[test]
    fn test_load_real_layout_null_screen() {
        let json = r#"{"speakers": [{"channel": 0, "names": "M+000"}], "screen": null}"#;
        let real = load_real_layout(json.as_bytes()).unwrap();
        assert_eq!(real.screen, None);
    }
}
