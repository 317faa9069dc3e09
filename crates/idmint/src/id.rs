use core::fmt;

/// A 64-bit entity identifier
///
/// - 1 bit reserved (always 0, keeps the value positive as a signed 64-bit)
/// - 41 bits timestamp (ms since [`DEFAULT_EPOCH`])
/// - 5 bits datacenter ID
/// - 5 bits worker ID
/// - 12 bits sequence
///
/// ```text
///  Bit Index:  63           63 62            22 21        17 16       12 11             0
///              +--------------+----------------+------------+-----------+---------------+
///  Field:      | reserved (1) | timestamp (41) | dc ID (5)  | wk ID (5) | sequence (12) |
///              +--------------+----------------+------------+-----------+---------------+
///              |<------------------ MSB ---------- 64 bits ---------- LSB ------------->|
/// ```
///
/// IDs issued by one allocator sort by issue order when compared numerically;
/// the `(datacenter_id, worker_id)` pair partitions the keyspace across
/// allocator instances.
///
/// [`DEFAULT_EPOCH`]: crate::DEFAULT_EPOCH
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId {
    id: u64,
}

impl EntityId {
    /// Bitmask for extracting the 41-bit timestamp field. Occupies bits 22
    /// through 62.
    pub const TIMESTAMP_MASK: u64 = (1 << 41) - 1;

    /// Bitmask for extracting the 5-bit datacenter ID field. Occupies bits 17
    /// through 21.
    pub const DATACENTER_ID_MASK: u64 = (1 << 5) - 1;

    /// Bitmask for extracting the 5-bit worker ID field. Occupies bits 12
    /// through 16.
    pub const WORKER_ID_MASK: u64 = (1 << 5) - 1;

    /// Bitmask for extracting the 12-bit sequence field. Occupies bits 0
    /// through 11.
    pub const SEQUENCE_MASK: u64 = (1 << 12) - 1;

    /// Number of bits to shift the timestamp to its correct position (bit 22).
    pub const TIMESTAMP_SHIFT: u64 = 22;

    /// Number of bits to shift the datacenter ID to its correct position (bit
    /// 17).
    pub const DATACENTER_ID_SHIFT: u64 = 17;

    /// Number of bits to shift the worker ID to its correct position (bit 12).
    pub const WORKER_ID_SHIFT: u64 = 12;

    /// Number of bits to shift the sequence field (bit 0).
    pub const SEQUENCE_SHIFT: u64 = 0;

    /// Packs the four fields into an ID.
    ///
    /// Each component is masked to its field width; overflow is caught by
    /// `debug_assert` in [`Self::from_parts`].
    pub const fn from(timestamp: u64, datacenter_id: u64, worker_id: u64, sequence: u64) -> Self {
        let timestamp = (timestamp & Self::TIMESTAMP_MASK) << Self::TIMESTAMP_SHIFT;
        let datacenter_id =
            (datacenter_id & Self::DATACENTER_ID_MASK) << Self::DATACENTER_ID_SHIFT;
        let worker_id = (worker_id & Self::WORKER_ID_MASK) << Self::WORKER_ID_SHIFT;
        let sequence = (sequence & Self::SEQUENCE_MASK) << Self::SEQUENCE_SHIFT;
        Self {
            id: timestamp | datacenter_id | worker_id | sequence,
        }
    }

    /// Constructs a new ID from its components, asserting field bounds in
    /// debug builds.
    pub fn from_parts(timestamp: u64, datacenter_id: u64, worker_id: u64, sequence: u64) -> Self {
        debug_assert!(timestamp <= Self::TIMESTAMP_MASK, "timestamp overflow");
        debug_assert!(
            datacenter_id <= Self::DATACENTER_ID_MASK,
            "datacenter_id overflow"
        );
        debug_assert!(worker_id <= Self::WORKER_ID_MASK, "worker_id overflow");
        debug_assert!(sequence <= Self::SEQUENCE_MASK, "sequence overflow");
        Self::from(timestamp, datacenter_id, worker_id, sequence)
    }

    /// Extracts the timestamp from the packed ID.
    pub const fn timestamp(&self) -> u64 {
        (self.id >> Self::TIMESTAMP_SHIFT) & Self::TIMESTAMP_MASK
    }

    /// Extracts the datacenter ID from the packed ID.
    pub const fn datacenter_id(&self) -> u64 {
        (self.id >> Self::DATACENTER_ID_SHIFT) & Self::DATACENTER_ID_MASK
    }

    /// Extracts the worker ID from the packed ID.
    pub const fn worker_id(&self) -> u64 {
        (self.id >> Self::WORKER_ID_SHIFT) & Self::WORKER_ID_MASK
    }

    /// Extracts the sequence number from the packed ID.
    pub const fn sequence(&self) -> u64 {
        (self.id >> Self::SEQUENCE_SHIFT) & Self::SEQUENCE_MASK
    }

    /// Returns the maximum representable timestamp value.
    pub const fn max_timestamp() -> u64 {
        Self::TIMESTAMP_MASK
    }

    /// Returns the maximum representable datacenter ID.
    pub const fn max_datacenter_id() -> u64 {
        Self::DATACENTER_ID_MASK
    }

    /// Returns the maximum representable worker ID.
    pub const fn max_worker_id() -> u64 {
        Self::WORKER_ID_MASK
    }

    /// Returns the maximum representable sequence value.
    pub const fn max_sequence() -> u64 {
        Self::SEQUENCE_MASK
    }

    /// Returns true if the reserved sign bit is zero.
    ///
    /// Every ID this crate issues is valid; the check exists for values
    /// arriving from external input (e.g. deserialization).
    pub const fn is_valid(&self) -> bool {
        self.id >> 63 == 0
    }

    /// Converts this ID into its raw `u64` representation.
    pub const fn to_raw(&self) -> u64 {
        self.id
    }

    /// Reconstructs an ID from its raw `u64` representation.
    pub const fn from_raw(raw: u64) -> Self {
        Self { id: raw }
    }

    /// Returns the ID as a zero-padded 20-digit string.
    ///
    /// Padded strings sort lexicographically in the same order as the
    /// underlying integers, which plain decimal strings do not.
    pub fn to_padded_string(&self) -> String {
        format!("{:020}", self.id)
    }

    /// Returns true if the current sequence value can be incremented without
    /// wrapping.
    pub(crate) const fn has_sequence_room(&self) -> bool {
        self.sequence() < Self::max_sequence()
    }

    /// Returns a new ID with the sequence incremented, same tick.
    pub(crate) fn increment_sequence(&self) -> Self {
        Self::from_parts(
            self.timestamp(),
            self.datacenter_id(),
            self.worker_id(),
            self.sequence() + 1,
        )
    }

    /// Returns a new ID for a newer timestamp with the sequence reset to zero.
    pub(crate) fn rollover_to_timestamp(&self, ts: u64) -> Self {
        Self::from_parts(ts, self.datacenter_id(), self.worker_id(), 0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityId")
            .field("id", &self.id)
            .field("timestamp", &self.timestamp())
            .field("datacenter_id", &self.datacenter_id())
            .field("worker_id", &self.worker_id())
            .field("sequence", &self.sequence())
            .finish()
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for EntityId {
    /// Serializes the ID as its raw integer representation.
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        s.serialize_u64(self.to_raw())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for EntityId {
    /// Deserializes an ID from its raw integer representation, rejecting
    /// values with the reserved bit set.
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = <u64 as serde::Deserialize>::deserialize(d)?;
        let id = Self::from_raw(raw);
        if !id.is_valid() {
            return Err(serde::de::Error::custom(format!(
                "entity id {raw} has the reserved bit set"
            )));
        }
        Ok(id)
    }
}
