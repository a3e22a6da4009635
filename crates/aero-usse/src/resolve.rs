//! Register bank resolution.
//!
//! Each bank maps 32-bit lane indices onto backend storage. Registers are bound once before
//! translation starts; the only mutation afterwards is the shadow map, which the resolver fills on
//! the first write to a primary or secondary attribute group (and on the first touch of an
//! unbacked secondary attribute). Once a group has a shadow every access to it goes through the
//! shadow.

use std::collections::BTreeMap;

use hashbrown::HashMap;
use tracing::{debug, trace};

use crate::error::TranslateError;
use crate::ir::{Backend, IrType, StorageClass};
use crate::types::RegisterBank;

/// A run of lanes backed by one storage location.
#[derive(Debug, Clone, PartialEq)]
pub struct Register<P> {
    pub place: P,
    /// Number of `f32` lanes the place holds.
    pub lanes: u32,
    /// Lane index of the first lane within the bank.
    pub base: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<P> {
    pub reg: Register<P>,
    /// Lane within `reg` that the requested index maps to.
    pub offset: u32,
}

#[derive(Debug, Clone)]
enum Entry<P> {
    Vector { place: P, lanes: u32 },
    /// Uniform-buffer alias: `len` vec4 elements.
    Array { place: P, len: u32 },
}

impl<P> Entry<P> {
    fn lanes(&self) -> u32 {
        match self {
            Entry::Vector { lanes, .. } => *lanes,
            Entry::Array { len, .. } => len * 4,
        }
    }
}

pub struct Resolver<B: Backend> {
    tables: HashMap<RegisterBank, BTreeMap<u32, Entry<B::Place>>>,
    shadows: HashMap<(RegisterBank, u32), Register<B::Place>>,
    predicates: [Option<B::Place>; 4],
}

impl<B: Backend> Default for Resolver<B> {
    fn default() -> Self {
        Resolver {
            tables: HashMap::new(),
            shadows: HashMap::new(),
            predicates: [None, None, None, None],
        }
    }
}

impl<B: Backend> Resolver<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `lanes` lanes starting at `base` to a vector (or scalar) place.
    pub fn bind(&mut self, bank: RegisterBank, base: u32, place: B::Place, lanes: u32) {
        self.tables
            .entry(bank)
            .or_default()
            .insert(base, Entry::Vector { place, lanes });
    }

    /// Binds a uniform-buffer array of `len` vec4 elements starting at lane `base`.
    pub fn bind_array(&mut self, bank: RegisterBank, base: u32, place: B::Place, len: u32) {
        self.tables
            .entry(bank)
            .or_default()
            .insert(base, Entry::Array { place, len });
    }

    pub fn is_bound(&self, bank: RegisterBank, lane: u32) -> bool {
        self.find(bank, lane).is_some()
    }

    /// Declares private vec4 registers for every 4-lane group of `lanes` that nothing binds yet.
    pub fn declare_bank(&mut self, backend: &mut B, bank: RegisterBank, lanes: u32) {
        for group in (0..lanes).step_by(4) {
            if (group..group + 4).any(|lane| self.is_bound(bank, lane)) {
                continue;
            }
            let name = format!("{}{}", bank.short_name(), group);
            let place = backend.declare(&name, IrType::VEC4, StorageClass::Private);
            self.bind(bank, group, place, 4);
        }
    }

    fn find(&self, bank: RegisterBank, lane: u32) -> Option<(u32, &Entry<B::Place>)> {
        let (&base, entry) = self.tables.get(&bank)?.range(..=lane).next_back()?;
        (lane < base + entry.lanes()).then_some((base, entry))
    }

    fn lookup(&self, backend: &mut B, bank: RegisterBank, lane: u32) -> Option<Resolved<B::Place>> {
        let (base, entry) = self.find(bank, lane)?;
        Some(match entry {
            Entry::Vector { place, lanes } => Resolved {
                reg: Register {
                    place: place.clone(),
                    lanes: *lanes,
                    base,
                },
                offset: lane - base,
            },
            Entry::Array { place, .. } => {
                let element = (lane - base) / 4;
                Resolved {
                    reg: Register {
                        place: backend.element(place, element),
                        lanes: 4,
                        base: base + element * 4,
                    },
                    offset: (lane - base) % 4,
                }
            }
        })
    }

    /// Resolves lane `index + sub_offset` of `bank`. Internal registers are four lanes wide, so
    /// their index is scaled first.
    ///
    /// With `for_store`, attribute lanes always resolve to the group's shadow, creating it if
    /// needed.
    pub fn resolve(
        &mut self,
        backend: &mut B,
        bank: RegisterBank,
        index: u32,
        sub_offset: i32,
        for_store: bool,
    ) -> Result<Resolved<B::Place>, TranslateError> {
        let scaled = if bank == RegisterBank::FpInternal {
            i64::from(index) * 4
        } else {
            i64::from(index)
        };
        let lane = u32::try_from(scaled + i64::from(sub_offset))
            .map_err(|_| TranslateError::Resolve { bank, index })?;

        let shadowed = matches!(bank, RegisterBank::PrimAttr | RegisterBank::SecAttr);
        if shadowed {
            let group = lane & !3;
            if let Some(reg) = self.shadows.get(&(bank, group)) {
                return Ok(Resolved {
                    reg: reg.clone(),
                    offset: lane - group,
                });
            }
            if for_store {
                let reg = self.make_shadow(backend, bank, group);
                return Ok(Resolved {
                    reg,
                    offset: lane - group,
                });
            }
        }

        if let Some(resolved) = self.lookup(backend, bank, lane) {
            return Ok(resolved);
        }

        if bank == RegisterBank::SecAttr {
            // Unbacked uniform registers are usable as scratch.
            let group = lane & !3;
            debug!(lane, "synthesizing secondary attribute register");
            let reg = self.make_shadow(backend, bank, group);
            return Ok(Resolved {
                reg,
                offset: lane - group,
            });
        }

        Err(TranslateError::Resolve { bank, index })
    }

    /// Creates the writable copy of an attribute group, seeded with the group's current contents.
    fn make_shadow(&mut self, backend: &mut B, bank: RegisterBank, group: u32) -> Register<B::Place> {
        let name = format!("{}{}_shadow", bank.short_name(), group);
        trace!(%name, "creating shadow register");
        let place = backend.declare(&name, IrType::VEC4, StorageClass::Private);

        let mut parts = Vec::with_capacity(4);
        let mut lane = group;
        while lane < group + 4 {
            match self.lookup(backend, bank, lane) {
                Some(found) => {
                    let value = backend.load(&found.reg.place);
                    let take = (found.reg.lanes - found.offset).min(group + 4 - lane);
                    let part = if found.offset == 0 && take == found.reg.lanes {
                        value
                    } else {
                        let indices: Vec<u32> = (found.offset..found.offset + take).collect();
                        backend.shuffle(&value, &value, &indices)
                    };
                    parts.push(part);
                    lane += take;
                }
                None => {
                    parts.push(backend.f32(0.0));
                    lane += 1;
                }
            }
        }
        let seed = backend.construct(&parts);
        backend.store(&place, &seed);

        let reg = Register {
            place,
            lanes: 4,
            base: group,
        };
        self.shadows.insert((bank, group), reg.clone());
        reg
    }

    pub fn shadow_count(&self) -> usize {
        self.shadows.len()
    }

    /// Storage of predicate register `n`, declared on first use.
    pub fn predicate(&mut self, backend: &mut B, n: i32) -> Result<B::Place, TranslateError> {
        let slot = usize::try_from(n)
            .ok()
            .filter(|&n| n < self.predicates.len())
            .ok_or(TranslateError::Resolve {
                bank: RegisterBank::Predicate,
                index: n.max(0) as u32,
            })?;
        if let Some(place) = &self.predicates[slot] {
            return Ok(place.clone());
        }
        let place = backend.declare(&format!("p{slot}"), IrType::BOOL, StorageClass::Private);
        self.predicates[slot] = Some(place.clone());
        Ok(place)
    }
}
