use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{self, AtomicU64};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use data_encoding::HEXLOWER_PERMISSIVE;
use err_derive::Error;
use hex_slice::AsHex;
use rand::distributions::{Distribution, Standard};
use rand::Rng;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

const ID_LEN: usize = 16;

pub struct Id<T> {
    val: [u8; ID_LEN],
    phantom: PhantomData<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    #[error(display = "Invalid prefix")]
    InvalidPrefix,
    #[error(display = "Unparseable Id")]
    Unparseable,
}

pub trait Entity {
    const PREFIX: &'static str;
}

const DIVIDER: &str = "-";

/// Generates identifiers whose leading eight bytes are a strictly increasing
/// nanosecond timestamp, so that the textual form sorts in creation order.
#[derive(Debug, Clone, Default)]
pub struct IdGen {
    last: Arc<AtomicU64>,
}

impl IdGen {
    pub fn new() -> Self {
        IdGen::default()
    }

    pub fn generate<T>(&self) -> Id<T> {
        let stamp = self.next_stamp();
        let random = rand::thread_rng().gen::<u64>();
        let mut val = [0u8; ID_LEN];
        val[..8].copy_from_slice(&stamp.to_be_bytes());
        val[8..].copy_from_slice(&random.to_be_bytes());
        Id {
            val,
            phantom: PhantomData,
        }
    }

    fn next_stamp(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let mut prev = self.last.load(atomic::Ordering::SeqCst);
        loop {
            let next = std::cmp::max(now, prev + 1);
            match self.last.compare_exchange(
                prev,
                next,
                atomic::Ordering::SeqCst,
                atomic::Ordering::SeqCst,
            ) {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

impl<T> Id<T> {
    pub fn timestamp_nanos(&self) -> u64 {
        let mut stamp = [0u8; 8];
        stamp.copy_from_slice(&self.val[..8]);
        u64::from_be_bytes(stamp)
    }
}

impl<T> Distribution<Id<T>> for Standard {
    fn sample<R: ?Sized + rand::Rng>(&self, rng: &mut R) -> Id<T> {
        let val = rng.gen();
        Id {
            val,
            phantom: PhantomData,
        }
    }
}

impl<T: Entity> fmt::Display for Id<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(
            fmt,
            "{}{}{}",
            T::PREFIX,
            DIVIDER,
            HEXLOWER_PERMISSIVE.encode(&self.val)
        )
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Id")
            .field("val", &format_args!("{:x}", self.val.as_hex()))
            .finish()
    }
}

impl<T: Entity> std::str::FromStr for Id<T> {
    type Err = IdParseError;
    fn from_str(src: &str) -> Result<Self, Self::Err> {
        let remainder = src
            .strip_prefix(T::PREFIX)
            .ok_or(IdParseError::InvalidPrefix)?;
        let hex = remainder
            .strip_prefix(DIVIDER)
            .ok_or(IdParseError::Unparseable)?;

        let bytes = HEXLOWER_PERMISSIVE
            .decode(hex.as_bytes())
            .map_err(|_| IdParseError::Unparseable)?;
        if bytes.len() != ID_LEN {
            return Err(IdParseError::Unparseable);
        }
        let mut id = Id::default();
        id.val.copy_from_slice(&bytes);
        Ok(id)
    }
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        let val = Default::default();
        let phantom = PhantomData;
        Id { val, phantom }
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.val.hash(state)
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.val == other.val
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.val.cmp(&other.val)
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        Id {
            val: self.val,
            phantom: self.phantom,
        }
    }
}

impl<T> Copy for Id<T> {}

impl<T: Entity> From<Id<T>> for serde_json::Value {
    fn from(id: Id<T>) -> Self {
        serde_json::Value::String(id.to_string())
    }
}

impl<T: Entity> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de, T: Entity> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdStrVisitor<T>(PhantomData<T>);
        impl<'vi, T: Entity> de::Visitor<'vi> for IdStrVisitor<T> {
            type Value = Id<T>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "an Id string")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Id<T>, E> {
                value.parse::<Id<T>>().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(IdStrVisitor(PhantomData))
    }
}
