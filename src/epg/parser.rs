//! XMLTV schedule parser
//! Builds an immutable snapshot of channels and their sorted programmes.
//! Accepts plain XML or gzip-compressed (.xml.gz) bytes.

use crate::error::EpgError;
use flate2::read::GzDecoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::collections::HashMap;
use std::io::{BufRead, Read};
use tracing::{debug, info};

/// A single programme as it appears in the schedule
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramRecord {
    /// Raw start timestamp, e.g. "20240826123000 +0300"
    pub start: String,
    /// Raw stop timestamp
    pub stop: String,
    pub title: String,
    pub description: Option<String>,
    /// First category, if any
    pub category: Option<String>,
    /// Episode info e.g. "S01E05"
    pub episode: Option<String>,
    pub icon: Option<String>,
}

/// One schedule-source channel and its programmes, sorted by start
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRecord {
    pub id: String,
    /// All display names in document order; never empty
    pub display_names: Vec<String>,
    pub icon: Option<String>,
    pub programs: Vec<ProgramRecord>,
}

impl ChannelRecord {
    /// First display name
    pub fn name(&self) -> &str {
        self.display_names.first().map(String::as_str).unwrap_or(&self.id)
    }
}

/// Counters describing what a parse kept and dropped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleStats {
    pub channels: usize,
    pub programs: usize,
    pub skipped_channels: usize,
    pub skipped_programmes: usize,
    /// Lexically smallest programme start
    pub first_start: Option<String>,
    /// Lexically largest programme stop
    pub last_stop: Option<String>,
}

/// Parsed schedule. Replaced wholesale on reload, never mutated.
#[derive(Debug, Clone, Default)]
pub struct ScheduleSnapshot {
    channels: Vec<ChannelRecord>,
    by_id: HashMap<String, usize>,
    stats: ScheduleStats,
}

impl ScheduleSnapshot {
    /// Create empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Channels in document order
    pub fn channels(&self) -> &[ChannelRecord] {
        &self.channels
    }

    pub fn channel(&self, id: &str) -> Option<&ChannelRecord> {
        self.by_id.get(id).map(|&i| &self.channels[i])
    }

    pub fn stats(&self) -> &ScheduleStats {
        &self.stats
    }

    /// Total number of programs
    pub fn program_count(&self) -> usize {
        self.channels.iter().map(|c| c.programs.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Parser state
#[derive(Debug, Clone, Copy, PartialEq)]
enum ParserState {
    Root,
    Channel,
    Programme,
    Title,
    Desc,
    Category,
    DisplayName,
    EpisodeNum,
}

/// A programme before its channel is known to exist
struct PendingProgram {
    channel_id: String,
    record: ProgramRecord,
}

/// Accumulates parse results until the document ends
#[derive(Default)]
struct SnapshotBuilder {
    channels: Vec<ChannelRecord>,
    by_id: HashMap<String, usize>,
    pending: Vec<PendingProgram>,
    stats: ScheduleStats,
    current_channel: Option<ChannelRecord>,
    current_program: Option<PendingProgram>,
    text_buf: String,
}

/// XMLTV parser
#[derive(Debug, Clone)]
pub struct ScheduleParser {
    placeholder_title: String,
}

impl Default for ScheduleParser {
    fn default() -> Self {
        Self::new("No title")
    }
}

impl ScheduleParser {
    /// `placeholder_title` is used for programmes without a title
    pub fn new(placeholder_title: impl Into<String>) -> Self {
        Self {
            placeholder_title: placeholder_title.into(),
        }
    }

    /// Parse a schedule document
    pub fn parse(&self, document: &str) -> Result<ScheduleSnapshot, EpgError> {
        self.parse_reader(SanitizingBufReader::new(document.as_bytes()))
    }

    /// Parse plain or gzip-compressed schedule bytes
    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<ScheduleSnapshot, EpgError> {
        // Gzip magic bytes (1f 8b)
        if bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b {
            let mut xml = Vec::with_capacity(bytes.len() * 8);
            GzDecoder::new(bytes).read_to_end(&mut xml)?;
            self.parse_reader(SanitizingBufReader::new(xml.as_slice()))
        } else {
            self.parse_reader(SanitizingBufReader::new(bytes))
        }
    }

    /// Streaming parse; stops at the first well-formedness error.
    pub fn parse_reader<R: BufRead>(&self, reader: R) -> Result<ScheduleSnapshot, EpgError> {
        let mut xml_reader = Reader::from_reader(reader);
        // Entity references arrive as separate events, so keep surrounding whitespace
        xml_reader.config_mut().trim_text(false);

        let mut buf = Vec::with_capacity(8192);
        let mut state = ParserState::Root;
        let mut depth = 0usize;
        let mut saw_root = false;

        let mut builder = SnapshotBuilder::default();

        loop {
            let position = xml_reader.buffer_position();
            let event = xml_reader.read_event_into(&mut buf).map_err(|e| EpgError::Xml {
                position,
                message: e.to_string(),
            })?;

            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let is_empty = matches!(event, Event::Empty(_));
                    let name = e.name();
                    let name_bytes = name.as_ref();

                    if !saw_root {
                        saw_root = true;
                        if name_bytes != b"tv" {
                            return Err(EpgError::UnexpectedRoot(
                                String::from_utf8_lossy(name_bytes).into_owned(),
                            ));
                        }
                    }
                    if !is_empty {
                        depth += 1;
                    }

                    match name_bytes {
                        b"channel" if state == ParserState::Root => {
                            state = ParserState::Channel;
                            builder.current_channel = Some(ChannelRecord {
                                id: get_attribute(e, b"id").unwrap_or_default(),
                                display_names: Vec::new(),
                                icon: None,
                                programs: Vec::new(),
                            });
                        }
                        b"programme" if state == ParserState::Root => {
                            state = ParserState::Programme;
                            builder.current_program = Some(PendingProgram {
                                channel_id: get_attribute(e, b"channel").unwrap_or_default(),
                                record: ProgramRecord {
                                    start: get_attribute(e, b"start").unwrap_or_default(),
                                    stop: get_attribute(e, b"stop").unwrap_or_default(),
                                    title: String::new(),
                                    description: None,
                                    category: None,
                                    episode: None,
                                    icon: None,
                                },
                            });
                        }
                        b"title" if state == ParserState::Programme => {
                            state = ParserState::Title;
                            builder.text_buf.clear();
                        }
                        b"desc" if state == ParserState::Programme => {
                            state = ParserState::Desc;
                            builder.text_buf.clear();
                        }
                        b"category" if state == ParserState::Programme => {
                            state = ParserState::Category;
                            builder.text_buf.clear();
                        }
                        b"episode-num" if state == ParserState::Programme => {
                            state = ParserState::EpisodeNum;
                            builder.text_buf.clear();
                        }
                        b"display-name" if state == ParserState::Channel => {
                            state = ParserState::DisplayName;
                            builder.text_buf.clear();
                        }
                        b"icon" => {
                            if let Some(src) = get_attribute(e, b"src") {
                                match state {
                                    ParserState::Channel => {
                                        if let Some(ref mut chan) = builder.current_channel {
                                            chan.icon.get_or_insert(src);
                                        }
                                    }
                                    ParserState::Programme => {
                                        if let Some(ref mut prog) = builder.current_program {
                                            prog.record.icon.get_or_insert(src);
                                        }
                                    }
                                    _ => {}
                                }
                            }
                        }
                        _ => {}
                    }

                    // A self-closing element never gets an End event
                    if is_empty {
                        state = builder.close_element(name_bytes, state, &self.placeholder_title);
                    }
                }
                Event::Text(ref e) => {
                    if is_text_state(state) {
                        builder.text_buf.push_str(&String::from_utf8_lossy(e.as_ref()));
                    }
                }
                Event::CData(ref e) => {
                    if is_text_state(state) {
                        builder.text_buf.push_str(&String::from_utf8_lossy(e.as_ref()));
                    }
                }
                Event::GeneralRef(ref e) => {
                    if is_text_state(state) {
                        let entity = format!("&{};", String::from_utf8_lossy(e.as_ref()));
                        builder.text_buf.push_str(&decode_xml_entities(&entity));
                    }
                }
                Event::End(ref e) => {
                    depth = depth.saturating_sub(1);
                    let name = e.name();
                    state = builder.close_element(name.as_ref(), state, &self.placeholder_title);
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !saw_root {
            return Err(EpgError::MissingRoot);
        }
        if depth > 0 {
            return Err(EpgError::Truncated(depth));
        }

        let SnapshotBuilder {
            mut channels,
            by_id,
            pending,
            mut stats,
            ..
        } = builder;

        // Attach programmes to known channels
        for PendingProgram { channel_id, record } in pending {
            match by_id.get(&channel_id) {
                Some(&i) => channels[i].programs.push(record),
                None => {
                    debug!(channel = %channel_id, "skipping programme for unknown channel");
                    stats.skipped_programmes += 1;
                }
            }
        }

        // Fixed-width digits sort lexically in time order; stable keeps document order for ties
        for channel in channels.iter_mut() {
            channel.programs.sort_by(|a, b| a.start.cmp(&b.start));
            for program in &channel.programs {
                if stats.first_start.as_deref().map_or(true, |s| program.start.as_str() < s) {
                    stats.first_start = Some(program.start.clone());
                }
                if stats.last_stop.as_deref().map_or(true, |s| program.stop.as_str() > s) {
                    stats.last_stop = Some(program.stop.clone());
                }
            }
        }

        stats.channels = channels.len();
        stats.programs = channels.iter().map(|c| c.programs.len()).sum();

        info!(
            channels = stats.channels,
            programs = stats.programs,
            skipped_channels = stats.skipped_channels,
            skipped_programmes = stats.skipped_programmes,
            "parsed schedule"
        );

        Ok(ScheduleSnapshot {
            channels,
            by_id,
            stats,
        })
    }
}

impl SnapshotBuilder {
    /// Finish the element `name`, returning the state to continue in.
    fn close_element(&mut self, name: &[u8], state: ParserState, placeholder_title: &str) -> ParserState {
        match (name, state) {
            (b"channel", ParserState::Channel) => {
                if let Some(channel) = self.current_channel.take() {
                    if channel.id.is_empty() || channel.display_names.is_empty() {
                        debug!(id = %channel.id, "skipping channel without id or display name");
                        self.stats.skipped_channels += 1;
                    } else if self.by_id.contains_key(&channel.id) {
                        debug!(id = %channel.id, "skipping duplicate channel");
                        self.stats.skipped_channels += 1;
                    } else {
                        self.by_id.insert(channel.id.clone(), self.channels.len());
                        self.channels.push(channel);
                    }
                }
                ParserState::Root
            }
            (b"programme", ParserState::Programme) => {
                if let Some(mut program) = self.current_program.take() {
                    let record = &mut program.record;
                    if program.channel_id.is_empty() || record.start.is_empty() || record.stop.is_empty()
                    {
                        debug!(channel = %program.channel_id, "skipping programme without channel or times");
                        self.stats.skipped_programmes += 1;
                    } else {
                        if record.title.is_empty() {
                            record.title = placeholder_title.to_string();
                        }
                        self.pending.push(program);
                    }
                }
                ParserState::Root
            }
            (b"title", ParserState::Title) => {
                if let Some(ref mut prog) = self.current_program {
                    // First title wins; later ones are usually translations
                    if prog.record.title.is_empty() {
                        prog.record.title = self.text_buf.trim().to_string();
                    }
                }
                ParserState::Programme
            }
            (b"desc", ParserState::Desc) => {
                if let Some(ref mut prog) = self.current_program {
                    let desc = self.text_buf.trim();
                    if !desc.is_empty() && prog.record.description.is_none() {
                        prog.record.description = Some(desc.to_string());
                    }
                }
                ParserState::Programme
            }
            (b"category", ParserState::Category) => {
                if let Some(ref mut prog) = self.current_program {
                    let cat = self.text_buf.trim();
                    if !cat.is_empty() && prog.record.category.is_none() {
                        prog.record.category = Some(cat.to_string());
                    }
                }
                ParserState::Programme
            }
            (b"episode-num", ParserState::EpisodeNum) => {
                if let Some(ref mut prog) = self.current_program {
                    let ep = format_episode(self.text_buf.trim());
                    if !ep.is_empty() && prog.record.episode.is_none() {
                        prog.record.episode = Some(ep);
                    }
                }
                ParserState::Programme
            }
            (b"display-name", ParserState::DisplayName) => {
                if let Some(ref mut chan) = self.current_channel {
                    let name = self.text_buf.trim();
                    if !name.is_empty() {
                        chan.display_names.push(name.to_string());
                    }
                }
                ParserState::Channel
            }
            _ => state,
        }
    }
}

fn is_text_state(state: ParserState) -> bool {
    matches!(
        state,
        ParserState::Title
            | ParserState::Desc
            | ParserState::Category
            | ParserState::DisplayName
            | ParserState::EpisodeNum
    )
}

/// Bytes read from the inner reader per refill
const CHUNK_SIZE: usize = 64 * 1024;

/// Longest entity name looked at before an `&` is judged bare
const MAX_ENTITY_LEN: usize = 10;

/// Verdict on an `&` found in the input
enum Ampersand {
    Entity,
    Bare,
    /// The chunk ends before the entity could be judged
    Undecided,
}

/// Reader that maps control characters to spaces and escapes bare `&`.
///
/// An `&` too close to the end of a chunk is carried over to the next refill,
/// so entities split across reads are left intact.
struct SanitizingBufReader<R> {
    inner: R,
    read_buf: Vec<u8>,
    /// Raw bytes not yet sanitized, including any carried tail
    pending: Vec<u8>,
    out: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl<R: Read> SanitizingBufReader<R> {
    fn new(inner: R) -> Self {
        Self::with_chunk_size(inner, CHUNK_SIZE)
    }

    fn with_chunk_size(inner: R, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            inner,
            read_buf: vec![0u8; chunk_size],
            pending: Vec::with_capacity(chunk_size + MAX_ENTITY_LEN),
            out: Vec::with_capacity(chunk_size + chunk_size / 2),
            pos: 0,
            eof: false,
        }
    }

    fn sanitize_byte(b: u8) -> u8 {
        match b {
            0x09 | 0x0A | 0x0D => b,
            0x00..=0x1F | 0x7F => b' ',
            _ => b,
        }
    }

    fn classify_ampersand(bytes: &[u8], at_eof: bool) -> Ampersand {
        let undecided = if at_eof { Ampersand::Bare } else { Ampersand::Undecided };
        match bytes.get(1) {
            None => return undecided,
            // Numeric references are trusted
            Some(b'#') => return Ampersand::Entity,
            Some(_) => {}
        }

        for (end, &b) in bytes.iter().enumerate().take(MAX_ENTITY_LEN).skip(1) {
            match b {
                b';' if end > 1 => return Ampersand::Entity,
                b if b.is_ascii_alphanumeric() => {}
                _ => return Ampersand::Bare,
            }
        }

        if bytes.len() >= MAX_ENTITY_LEN {
            Ampersand::Bare
        } else {
            undecided
        }
    }

    /// Sanitize as much of `pending` as can be decided; returns the bytes consumed.
    fn sanitize_pending(&mut self) -> usize {
        let input = &self.pending;
        let mut i = 0;
        while i < input.len() {
            let b = Self::sanitize_byte(input[i]);
            if b == b'&' {
                match Self::classify_ampersand(&input[i..], self.eof) {
                    Ampersand::Entity => self.out.push(b'&'),
                    Ampersand::Bare => self.out.extend_from_slice(b"&amp;"),
                    Ampersand::Undecided => break,
                }
            } else {
                self.out.push(b);
            }
            i += 1;
        }
        i
    }

    fn refill(&mut self) -> std::io::Result<()> {
        self.out.clear();
        self.pos = 0;

        while self.out.is_empty() && !(self.eof && self.pending.is_empty()) {
            if !self.eof {
                let n = self.inner.read(&mut self.read_buf)?;
                self.pending.extend_from_slice(&self.read_buf[..n]);
                self.eof = n == 0;
            }
            let consumed = self.sanitize_pending();
            self.pending.drain(..consumed);
        }
        Ok(())
    }
}

impl<R: Read> Read for SanitizingBufReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl<R: Read> BufRead for SanitizingBufReader<R> {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        if self.pos >= self.out.len() {
            self.refill()?;
        }
        Ok(&self.out[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.out.len());
    }
}

/// Decode XML entities back to normal characters
fn decode_xml_entities(s: &str) -> String {
    let mut result = s
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ");

    // Numeric entities, decimal or hex
    while let Some(start) = result.find("&#") {
        let Some(end) = result[start..].find(';') else { break };
        let entity = result[start..start + end + 1].to_string();
        let num_str = &entity[2..entity.len() - 1];

        let decoded = if let Some(hex) = num_str.strip_prefix('x').or_else(|| num_str.strip_prefix('X')) {
            u32::from_str_radix(hex, 16).ok()
        } else {
            num_str.parse::<u32>().ok()
        };

        match decoded.and_then(char::from_u32) {
            Some(c) => result = result.replace(&entity, &c.to_string()),
            None => break, // Malformed entity, stop processing
        }
    }

    // Last, so "&amp;lt;" stays "&lt;"
    result.replace("&amp;", "&")
}

/// Get attribute value from XML element
fn get_attribute(e: &BytesStart, name: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == name {
            let raw = String::from_utf8(attr.value.as_ref().to_vec()).ok()?;
            return Some(decode_xml_entities(raw.trim()));
        }
    }
    None
}

/// Format episode number (e.g., "0.4." -> "S01E05")
fn format_episode(episode: &str) -> String {
    let episode = episode.trim();

    // XMLTV format: "season.episode.part" (0-indexed)
    let parts: Vec<&str> = episode.split('.').collect();

    if parts.len() >= 2 {
        let season: i32 = parts[0].trim().parse().unwrap_or(-1) + 1;
        let ep: i32 = parts[1].trim().split('/').next().unwrap_or("").parse().unwrap_or(-1) + 1;

        if season > 0 && ep > 0 {
            return format!("S{:02}E{:02}", season, ep);
        }
    }

    episode.to_string()
}
