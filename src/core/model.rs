// Public data model: Datafile, Channel, Marker, Journal.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::core::encoding::TextEncoding;
use crate::core::error::ReadWarning;
use crate::core::revisions::version_string_guess;
use crate::core::schema::HeaderRecord;
use crate::core::source::ByteOrder;

/// Storage type of one channel's samples. Within one file channels mix
/// freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SampleDtype {
    I16,
    F64,
}

impl SampleDtype {
    pub const fn sample_size(self) -> usize {
        match self {
            SampleDtype::I16 => 2,
            SampleDtype::F64 => 8,
        }
    }
}

/// A channel's samples as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawData {
    I16(Vec<i16>),
    F64(Vec<f64>),
}

impl RawData {
    pub fn len(&self) -> usize {
        match self {
            RawData::I16(v) => v.len(),
            RawData::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One acquired signal.
#[derive(Debug, Clone, Serialize)]
pub struct Channel {
    /// Identifier markers use to reference this channel. Not the
    /// positional index.
    pub order_num: i32,
    pub name: String,
    pub units: String,
    /// Power-of-two divider of the file's base rate.
    pub frequency_divider: u32,
    pub samples_per_second: f64,
    /// Expected sample count, from the channel header.
    pub point_count: usize,
    pub dtype: SampleDtype,
    pub scale: f64,
    pub offset: f64,
    /// Lazily materialised; `None` until the sample iterator has run for
    /// this channel.
    pub raw_data: Option<RawData>,
}

impl Channel {
    pub fn sample_size(&self) -> usize {
        self.dtype.sample_size()
    }

    /// Bytes this channel occupies in the uncompressed data region.
    pub fn data_length(&self) -> usize {
        self.point_count * self.sample_size()
    }

    pub fn loaded(&self) -> bool {
        self.raw_data.is_some()
    }

    /// Samples as AcqKnowledge reports them: `raw * scale + offset`.
    /// Float channels carry scale 1 and offset 0 by construction, so this
    /// is the identity for them.
    pub fn scaled_data(&self) -> Option<Vec<f64>> {
        match self.raw_data.as_ref()? {
            RawData::I16(v) => Some(
                v.iter()
                    .map(|&s| s as f64 * self.scale + self.offset)
                    .collect(),
            ),
            RawData::F64(v) => Some(v.clone()),
        }
    }

    /// Seconds from recording start for each sample of this channel.
    pub fn time_index(&self) -> Vec<f64> {
        (0..self.point_count)
            .map(|i| i as f64 / self.samples_per_second)
            .collect()
    }

    /// The channel's data aligned to the base rate by nearest-neighbor
    /// repetition: element `j` is sample `j / frequency_divider`.
    pub fn upsampled_data(&self) -> Option<Vec<f64>> {
        let data = self.scaled_data()?;
        let div = self.frequency_divider as usize;
        Some((0..data.len() * div).map(|j| data[j / div]).collect())
    }

    /// Drop materialised samples so a long-lived model can shed memory.
    pub fn free_data(&mut self) {
        self.raw_data = None;
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Channel {}: {} samples, {} samples/sec, loaded: {}",
            self.name,
            self.point_count,
            self.samples_per_second,
            self.loaded()
        )
    }
}

/// An annotation at a point in time, optionally attached to a channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    /// Position in units of the base rate, regardless of any channel's
    /// divider.
    pub global_sample_index: u64,
    pub label: String,
    /// Four-character type code, post-4 files only.
    pub type_code: Option<String>,
    /// `None` for global markers. A value that matches no channel's
    /// `order_num` is kept (with a warning on the datafile).
    pub channel_number: Option<i32>,
    pub created_at: Option<DateTime<Utc>>,
    /// Display color from the legacy metadata block, pre-4 files only.
    pub color: Option<[u8; 4]>,
    /// Style tag from the legacy metadata block, pre-4 files only.
    pub style_tag: Option<i16>,
}

impl Marker {
    pub fn is_global(&self) -> bool {
        self.channel_number.is_none()
    }

    /// Human-readable name for the type code.
    pub fn type_name(&self) -> &'static str {
        match &self.type_code {
            None => "None",
            Some(code) => marker_type_name(code),
        }
    }
}

/// Free-form notes attached to the recording. Plain text before 4.2,
/// HTML from 4.2 on.
#[derive(Debug, Clone, Serialize)]
pub struct Journal {
    pub text: String,
    pub header: HeaderRecord,
}

/// The aggregate root: everything parsed from one .acq file.
#[derive(Debug, Serialize)]
pub struct Datafile {
    pub file_revision: u32,
    pub byte_order: ByteOrder,
    pub text_encoding: TextEncoding,
    pub is_compressed: bool,
    /// The base sampling rate; channels run at this divided by their
    /// frequency divider.
    pub samples_per_second: f64,
    pub graph_header: HeaderRecord,
    pub channels: Vec<Channel>,
    pub markers: Vec<Marker>,
    pub journal: Option<Journal>,
    pub warnings: Vec<ReadWarning>,
}

impl Datafile {
    pub fn channel_by_order_num(&self, order_num: i32) -> Option<&Channel> {
        self.channels.iter().find(|c| c.order_num == order_num)
    }

    pub fn channel_named(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// Resolve a marker's channel reference. Global markers and markers
    /// whose channel number matches nothing yield `None`.
    pub fn marker_channel(&self, marker: &Marker) -> Option<&Channel> {
        self.channel_by_order_num(marker.channel_number?)
    }

    /// The marker's position in its channel's own sample index.
    pub fn marker_channel_sample_index(&self, marker: &Marker) -> Option<u64> {
        let channel = self.marker_channel(marker)?;
        Some(marker.global_sample_index / channel.frequency_divider as u64)
    }

    /// Best guess at when the recording was made: the earliest marker
    /// creation time, when any marker carries one.
    pub fn earliest_marker_created_at(&self) -> Option<DateTime<Utc>> {
        self.markers.iter().filter_map(|m| m.created_at).min()
    }
}

impl std::fmt::Display for Datafile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AcqKnowledge file (rev {}, version {}): {} channels, {} samples/sec",
            self.file_revision,
            version_string_guess(self.file_revision),
            self.channels.len(),
            self.samples_per_second
        )
    }
}

/// Marker creation times are milliseconds since the Unix epoch. Some
/// files carry absurdly large values; those become `None`.
pub(crate) fn created_at_from_ms(ms: u64) -> Option<DateTime<Utc>> {
    let ms = i64::try_from(ms).ok()?;
    Utc.timestamp_millis_opt(ms).single()
}

/// Human-readable names for the four-character marker type codes.
pub fn marker_type_name(code: &str) -> &'static str {
    match code {
        "apnd" => "Append",
        "defl" => "Default",
        "wfon" => "Waveform Onset",
        "wfof" => "Waveform End",
        "nois" => "Change in Signal Quality",
        "rhyt" => "Change in Rhythm",
        "recv" => "Recovery",
        "max " => "Maximum",
        "min " => "Minimum",
        "rset" => "Reset",
        "cmlb" => "Communication Lost Begin",
        "cmle" => "Communication Lost End",
        "ansh" => "Short Arrow",
        "anmd" => "Medium Arrow",
        "anlg" => "Long Arrow",
        "flag" => "Flag",
        "star" => "Star",
        "usr1" => "User Type 1",
        "usr2" => "User Type 2",
        "usr3" => "User Type 3",
        "usr4" => "User Type 4",
        "usr5" => "User Type 5",
        "usr6" => "User Type 6",
        "usr7" => "User Type 7",
        "usr8" => "User Type 8",
        "usr9" => "User Type 9",
        "qrsb" => "QRS Onset",
        "qrs " => "QRS Peak",
        "qrse" => "QRS End",
        "tbeg" => "T-wave Onset",
        "t   " => "T-wave Peak",
        "tend" => "T-wave End",
        "pbeg" => "P-wave Onset",
        "p   " => "P-wave Peak",
        "pend" => "P-wave End",
        "q   " => "Q-wave Peak",
        "s   " => "S-wave Peak",
        "u   " => "U-wave Peak",
        "pq  " => "PQ Junction",
        "jpt " => "J-point",
        "stch" => "ST Segment Change",
        "tch " => "T-wave Change",
        "nrml" => "Normal Beat",
        "pace" => "Paced Beat",
        "pfus" => "Fusion of Paced and Normal Beat",
        "lbbb" => "Left Bundle Branch Block Beat",
        "rbbb" => "Right Bundle Branch Block Beat",
        "bbb " => "Bundle Branch Block Beat",
        "apc " => "Atrial Premature Beat",
        "aber" => "Aberrated Atrial Premature Beat",
        "npc " => "Nodal Premature Beat",
        "svpb" => "Supraventricular Premature Beat",
        "pvc " => "Premature Ventricular Contraction",
        "ront" => "R-on-T Premature Ventricular Contraction",
        "fusi" => "Fusion of Ventricular and Normal Beat",
        "aesc" => "Atrial Escape Beat",
        "nesc" => "Nodal Escape Beat",
        "sves" => "Supraventricular Escape Beat",
        "vesc" => "Ventricular Escape Beat",
        "syst" => "Systole",
        "dias" => "Diastole",
        "edp " => "End Diastolic Pressure",
        "aptz" => "A-point",
        "bptz" => "B-point",
        "cptz" => "C-point",
        "xptz" => "X-point",
        "yptz" => "Y-point",
        "optz" => "O-point",
        "plat" => "Plateau",
        "upst" => "Upstroke",
        "vfon" => "Start of Ventricular Flutter",
        "flwa" => "Ventricular Flutter Wave",
        "vfof" => "End of Ventricular Flutter",
        "pesp" => "Pacemaker Artifact",
        "arfc" => "Isolated QRS-like Artifact",
        "napc" => "Non-conducted P-wave",
        "base" => "Baseline",
        "dose" => "Dose",
        "wash" => "Wash",
        "apon" => "Spike Episode Begin",
        "apof" => "Spike Episode End",
        "rein" => "Inspire Start",
        "reot" => "Expire Start",
        "reap" => "Apnea Start",
        "stim" => "Stimulus Delivery",
        "resp" => "Response",
        "scr " => "Skin Conductance Response",
        "sscr" => "Specific SCR",
        "ctr1" => "Cluster 1",
        "ctr2" => "Cluster 2",
        "ctr3" => "Cluster 3",
        "ctr4" => "Cluster 4",
        "ctr5" => "Cluster 5",
        "ctr6" => "Cluster 6",
        "ctr7" => "Cluster 7",
        "ctr8" => "Cluster 8",
        "ctr9" => "Cluster 9",
        "ctrn" => "Cluster n",
        "cend" => "End Cluster",
        "outl" => "Outlier",
        "tran" => "Training Set",
        "cut " => "Cut",
        "vb  " => "Paste Begin",
        "ve  " => "Paste End",
        "selb" => "Selection Begin",
        "sele" => "Selection End",
        "steb" => "Start of Eye Blink Artifact",
        "eneb" => "End of Eye Blink Artifact",
        "sexc" => "Start of Excursion Artifact",
        "eexc" => "End of Excursion Artifact",
        "ssat" => "Start of Saturation Artifact",
        "esat" => "End of Saturation Artifact",
        "sspk" => "Start of Spike Artifact",
        "espk" => "End of Spike Artifact",
        "semg" => "Start of EMG Artifact",
        "eemg" => "End of EMG Artifact",
        "wles" => "Workload - EMG Start",
        "wlee" => "Workload - EMG End",
        "ipss" => "Workload - Invalid PSD Start",
        "ipse" => "Workload - Invalid PSD End",
        "ddst" => "Dummy Data Start",
        "dded" => "Dummy Data End",
        "idst" => "Misaligned Data",
        "bprs" => "Button Pressed",
        "leho" => "Left Eye Hit Object",
        "reho" => "Right Eye Hit Object",
        "smis" => "SMI Stimulus Image Has Been Presented to the Subject",
        "mors" => "Start Out of Range",
        "more" => "End Out of Range",
        _ => "Unknown",
    }
}
