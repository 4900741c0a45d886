//! UICC Common - TLV decoding and data codecs shared by the UICC crates

pub mod codec;

/// TLV (Tag-Length-Value) scanner for UICC metadata
///
/// Searches a flat sequence of TLV objects for the first one carrying `tag`
/// and returns its value. Tags are a single byte and lengths are a single
/// byte, which is all the FCP and EF.DIR objects used here ever need.
///
/// # Arguments
/// * `data` - The TLV-encoded data to search
/// * `tag` - The tag byte to search for
///
/// # Returns
/// * `Some(&[u8])` - The value bytes if the tag is found (clipped to the buffer)
/// * `None` - If the tag is not present at the top level of `data`
pub fn find_tag(data: &[u8], tag: u8) -> Option<&[u8]> {
    let mut i = 0;
    while i < data.len() {
        let current_tag = data[i];

        // A tag without a length byte ends the scan
        let Some(&len) = data.get(i + 1) else {
            break;
        };
        let start = i + 2;

        if current_tag == tag {
            let end = (start + len as usize).min(data.len());
            return Some(&data[start..end]);
        }

        // Skip value and continue to next tag
        i = start + len as usize;
    }
    None
}

/// Extract the value of a named tag, or an empty slice when it is absent
pub fn extract(data: &[u8], tag: Tag) -> &[u8] {
    find_tag(data, tag.byte()).unwrap_or(&[])
}

/// Tags found in FCP templates and EF.DIR application templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    ApplicationTemplate,
    FcpTemplate,
    Aid,
    ApplicationLabel,
    FileSizeData,
    FileSizeTotal,
    FileDescriptor,
    FileIdentifier,
    DfName,
    LifeCycleStatus,
    SecurityAttributesReferenced,
    SecurityAttributesCompact,
    SecurityAttributesExpanded,
    Sfi,
}

/// Tag to wire byte dictionary
static TAGS: &[(Tag, u8)] = &[
    (Tag::ApplicationTemplate, 0x61),
    (Tag::FcpTemplate, 0x62),
    (Tag::Aid, 0x4F),
    (Tag::ApplicationLabel, 0x50),
    (Tag::FileSizeData, 0x80),
    (Tag::FileSizeTotal, 0x81),
    (Tag::FileDescriptor, 0x82),
    (Tag::FileIdentifier, 0x83),
    (Tag::DfName, 0x84),
    (Tag::LifeCycleStatus, 0x8A),
    (Tag::SecurityAttributesReferenced, 0x8B),
    (Tag::SecurityAttributesCompact, 0x8C),
    (Tag::SecurityAttributesExpanded, 0xAB),
    (Tag::Sfi, 0x88),
];

impl Tag {
    /// Tag byte as it appears on the wire
    pub fn byte(self) -> u8 {
        TAGS.iter()
            .find(|(t, _)| *t == self)
            .map(|(_, b)| *b)
            .unwrap_or(0)
    }
}

/// Decode a big-endian unsigned integer of any width up to 8 bytes
pub fn be_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}
