//! Per-call scratch state for the creation codec. Both tables are rebuilt at
//! the start of every encode or decode and dropped at the end; nothing here
//! survives between calls.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::io::Error;
use crate::registry::{BrickRegistry, PropertyTypeTag};
use crate::structs::{Brick, BrickName, PropertyValue};

use super::utils::u16_len;

/// Maps brick identities to their 0-based ordinal (insertion order) and back.
///
/// On the wire every brick reference is stored as ordinal+1, with 0 reserved
/// for "no brick".
pub(crate) struct BrickIndexTable<'a> {
    ordinals: IndexMap<&'a BrickName, u16>,
}

impl<'a> BrickIndexTable<'a> {
    pub(crate) fn build(bricks: &'a [Brick]) -> Result<Self, Error> {
        let mut ordinals = IndexMap::with_capacity(bricks.len());
        for (i, brick) in bricks.iter().enumerate() {
            // Duplicate names: the later brick wins, matching map semantics.
            ordinals.insert(&brick.name, u16_len(i)?);
        }
        Ok(BrickIndexTable { ordinals })
    }

    pub(crate) fn resolve(&self, name: &BrickName) -> Result<u16, Error> {
        self.ordinals
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownBrick(name.clone()))
    }

    /// Ordinal+1 form used everywhere on the wire.
    pub(crate) fn wire_ref(&self, name: &BrickName) -> Result<u16, Error> {
        self.resolve(name)?.checked_add(1).ok_or(Error::Range {
            value: u16::MAX as i128 + 1,
            bits: 16,
        })
    }
}

/// Distinct values of one property, in ValueId order.
///
/// Distinctness is by *object identity* of the shared value, not structural
/// equality: the key is the `Rc`'s pointer. Callers that want two bricks to
/// share a slot must clone one `Rc` across them.
pub(crate) struct ValueTable {
    /// Wire type of every value in this table.
    pub(crate) tag: PropertyTypeTag,
    ids: IndexMap<*const PropertyValue, u16>,
    pub(crate) values: Vec<Rc<PropertyValue>>,
}

impl ValueTable {
    fn new(tag: PropertyTypeTag) -> Self {
        ValueTable {
            tag,
            ids: IndexMap::new(),
            values: Vec::new(),
        }
    }
}

/// PropertyId and ValueId assignment for one encode pass.
///
/// One walk over the bricks in order: properties equal to their type default
/// are skipped; the rest get dense ids in first-appearance order.
pub(crate) struct PropertyTables {
    props: IndexMap<String, ValueTable>,
}

impl PropertyTables {
    pub(crate) fn build<R>(bricks: &[Brick], registry: &R) -> Result<Self, Error>
    where
        R: BrickRegistry + ?Sized,
    {
        let mut props: IndexMap<String, ValueTable> = IndexMap::new();

        for brick in bricks {
            let defaults = registry
                .defaults_for(brick.brick_type())
                .ok_or_else(|| Error::UnknownBrickType(brick.brick_type().to_owned()))?;

            for (key, value) in &brick.properties {
                let default = defaults.get(key).ok_or_else(|| Error::UnknownProperty {
                    brick_type: brick.brick_type().to_owned(),
                    property: key.clone(),
                })?;
                if value == default {
                    continue;
                }

                let tag = registry
                    .type_tag_for(key)
                    .ok_or_else(|| Error::UnknownProperty {
                        brick_type: brick.brick_type().to_owned(),
                        property: key.clone(),
                    })?;
                let table = props
                    .entry(key.clone())
                    .or_insert_with(|| ValueTable::new(tag));
                let ptr = Rc::as_ptr(value);
                if !table.ids.contains_key(&ptr) {
                    let id = u16_len(table.values.len())?;
                    table.ids.insert(ptr, id);
                    table.values.push(value.clone());
                }
            }
        }

        Ok(PropertyTables { props })
    }

    /// Number of distinct (non-default) properties.
    pub(crate) fn len(&self) -> usize {
        self.props.len()
    }

    /// Properties in PropertyId order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &ValueTable)> {
        self.props.iter()
    }

    /// The (PropertyId, ValueId) pairs of one brick's non-default properties,
    /// in the brick's own property order.
    pub(crate) fn diff_for<R>(&self, brick: &Brick, registry: &R) -> Result<Vec<(u16, u16)>, Error>
    where
        R: BrickRegistry + ?Sized,
    {
        let defaults = registry
            .defaults_for(brick.brick_type())
            .ok_or_else(|| Error::UnknownBrickType(brick.brick_type().to_owned()))?;

        let mut diff = Vec::new();
        for (key, value) in &brick.properties {
            if defaults.get(key) == Some(value) {
                continue;
            }
            let out_of_sync =
                || Error::MalformedData(format!("property tables out of sync for {key:?}"));
            let (prop_id, _, table) = self.props.get_full(key).ok_or_else(out_of_sync)?;
            let val_id = *table
                .ids
                .get(&Rc::as_ptr(value))
                .ok_or_else(out_of_sync)?;
            diff.push((u16_len(prop_id)?, val_id));
        }
        Ok(diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::test_registry;
    use crate::structs::Brick;

    #[test]
    fn index_table_resolves_in_insertion_order() {
        let registry = test_registry();
        let bricks = vec![
            Brick::new("Switch_1sx1sx1s", "a", &registry).unwrap(),
            Brick::new("Switch_1sx1sx1s", 7i64, &registry).unwrap(),
            Brick::new("Seat_2x2x7s", "seat", &registry).unwrap(),
        ];

        let table = BrickIndexTable::build(&bricks).unwrap();
        assert_eq!(table.resolve(&"a".into()).unwrap(), 0);
        assert_eq!(table.resolve(&7i64.into()).unwrap(), 1);
        assert_eq!(table.wire_ref(&"seat".into()).unwrap(), 3);
    }

    #[test]
    fn unresolved_reference_names_the_culprit() {
        let registry = test_registry();
        let bricks = vec![Brick::new("Seat_2x2x7s", "seat", &registry).unwrap()];
        let table = BrickIndexTable::build(&bricks).unwrap();

        let err = table.resolve(&"ghost".into()).unwrap_err();
        assert!(matches!(err, Error::UnknownBrick(BrickName::Str(s)) if s == "ghost"));
    }

    #[test]
    fn dedup_is_by_identity_not_equality() {
        let registry = test_registry();
        let shared = Rc::new(PropertyValue::Float(3.5));

        let mut a = Brick::new("Switch_1sx1sx1s", "a", &registry).unwrap();
        a.set_shared("InputChannel.Value", shared.clone());
        let mut b = Brick::new("Switch_1sx1sx1s", "b", &registry).unwrap();
        b.set_shared("InputChannel.Value", shared);
        // Equal value, separate allocation: gets its own slot.
        let mut c = Brick::new("Switch_1sx1sx1s", "c", &registry).unwrap();
        c.set_property("InputChannel.Value", PropertyValue::Float(3.5));

        let bricks = vec![a, b, c];
        let tables = PropertyTables::build(&bricks, &registry).unwrap();
        assert_eq!(tables.len(), 1);
        let (name, table) = tables.iter().next().unwrap();
        assert_eq!(name, "InputChannel.Value");
        assert_eq!(table.values.len(), 2);

        assert_eq!(
            tables.diff_for(&bricks[0], &registry).unwrap(),
            vec![(0, 0)]
        );
        assert_eq!(
            tables.diff_for(&bricks[1], &registry).unwrap(),
            vec![(0, 0)]
        );
        assert_eq!(
            tables.diff_for(&bricks[2], &registry).unwrap(),
            vec![(0, 1)]
        );
    }

    #[test]
    fn default_valued_properties_never_reach_the_tables() {
        let registry = test_registry();
        let brick = Brick::new("Switch_1sx1sx1s", "a", &registry).unwrap();
        let bricks = vec![brick];

        let tables = PropertyTables::build(&bricks, &registry).unwrap();
        assert_eq!(tables.len(), 0);
        assert!(tables.diff_for(&bricks[0], &registry).unwrap().is_empty());
    }
}
