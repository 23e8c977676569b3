//! Menu compilation: reconciles the dish set a provider asks for with the
//! items already on the menu.
//!
//! The planner is pure. It reads a snapshot of the current items, decides
//! which items go, which are resized and which are created, and validates the
//! whole batch against committed counts before anything is written. Stores
//! execute the resulting [`MenuPlan`] inside one transaction.

use std::collections::{BTreeMap, HashMap, HashSet};

use bigdecimal::BigDecimal;
use uuid::Uuid;

use crate::ledger::{self, Counts};
use crate::{Dish, ItemCount, LunchError, LunchResult, MenuItem};

/// Three-way split of a requested dish set against the current items.
#[derive(Debug, Default)]
pub struct MenuDiff<'a> {
    /// on the menu, not requested
    pub removed: Vec<&'a MenuItem>,
    /// on the menu and requested, with the requested count
    pub kept: Vec<(&'a MenuItem, i64)>,
    /// requested, not on the menu yet
    pub added: Vec<(Uuid, i64)>,
}

pub fn partition<'a>(current: &'a [MenuItem], requested: &BTreeMap<Uuid, i64>) -> MenuDiff<'a> {
    let mut diff = MenuDiff::default();
    let mut present = HashSet::with_capacity(current.len());

    for item in current {
        present.insert(item.dish_id);
        match requested.get(&item.dish_id) {
            Some(&count) => diff.kept.push((item, count)),
            None => diff.removed.push(item),
        }
    }

    diff.added = requested
        .iter()
        .filter(|(dish_id, _)| !present.contains(dish_id))
        .map(|(&dish_id, &count)| (dish_id, count))
        .collect();

    diff
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resize {
    pub item_id: Uuid,
    pub dish_id: Uuid,
    /// `initial_count` observed when planning; stores compare against it.
    pub from: Counts,
    pub to: Counts,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub dish_id: Uuid,
    pub count: i64,
    pub price: BigDecimal,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MenuPlan {
    pub remove: Vec<MenuItem>,
    pub resize: Vec<Resize>,
    pub create: Vec<NewItem>,
}

impl MenuPlan {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.resize.is_empty() && self.create.is_empty()
    }
}

/// Turns a request body into a dish -> count map, rejecting negative counts and
/// repeated dishes.
pub fn requested_counts(items: &[ItemCount]) -> LunchResult<BTreeMap<Uuid, i64>> {
    let mut counts = BTreeMap::new();
    for item in items {
        if item.count < 0 {
            return Err(LunchError::validation(format!(
                "Count of dish {} cannot be negative",
                item.dish_id
            )));
        }
        if counts.insert(item.dish_id, item.count).is_some() {
            return Err(LunchError::validation(format!(
                "Dish {} is listed more than once",
                item.dish_id
            )));
        }
    }
    Ok(counts)
}

/// Plans the transition from `current` to `requested`.
///
/// `dishes` must hold at least every dish that is not on the menu yet; their
/// prices are snapshotted into the new items.
pub fn plan_menu(
    provider_id: Uuid,
    current: &[MenuItem],
    requested: &BTreeMap<Uuid, i64>,
    dishes: &HashMap<Uuid, Dish>,
) -> LunchResult<MenuPlan> {
    let diff = partition(current, requested);
    let mut conflicts = BTreeMap::new();
    let mut plan = MenuPlan::default();

    for item in diff.removed {
        let committed = item.committed_count();
        if committed > 0 {
            conflicts.insert(item.dish_id, committed);
        } else {
            plan.remove.push(item.clone());
        }
    }

    for (item, count) in diff.kept {
        let from = Counts::from(item);
        match ledger::resize(from, count) {
            Ok(to) if to == from => {}
            Ok(to) => plan.resize.push(Resize {
                item_id: item.id,
                dish_id: item.dish_id,
                from,
                to,
            }),
            Err(_) => {
                conflicts.insert(item.dish_id, item.committed_count());
            }
        }
    }

    if !conflicts.is_empty() {
        return Err(LunchError::CapacityConflict(conflicts));
    }

    for (dish_id, count) in diff.added {
        let dish = dishes
            .get(&dish_id)
            .filter(|dish| dish.provider_id == provider_id && !dish.is_removed)
            .ok_or_else(|| LunchError::not_found(format!("Unable to find dish {}", dish_id)))?;

        plan.create.push(NewItem {
            dish_id,
            count,
            price: dish.price.clone(),
        });
    }

    Ok(plan)
}

/// The dish counts a cloned menu starts with: initial counts of the source,
/// leaving out dishes the provider has removed since.
pub fn clone_counts(source: &[MenuItem], dishes: &HashMap<Uuid, Dish>) -> Vec<ItemCount> {
    source
        .iter()
        .filter(|item| {
            dishes
                .get(&item.dish_id)
                .map(|dish| !dish.is_removed)
                .unwrap_or(false)
        })
        .map(|item| ItemCount::new(item.dish_id, item.initial_count))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        provider_id: Uuid,
        menu_id: Uuid,
        dishes: HashMap<Uuid, Dish>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                provider_id: Uuid::new_v4(),
                menu_id: Uuid::new_v4(),
                dishes: HashMap::new(),
            }
        }

        fn dish(&mut self, price: i64) -> Uuid {
            let dish = Dish {
                id: Uuid::new_v4(),
                provider_id: self.provider_id,
                price: BigDecimal::from(price),
                weight: 0.0,
                calories: 0.0,
                is_removed: false,
            };
            let id = dish.id;
            self.dishes.insert(id, dish);
            id
        }

        fn item(&self, dish_id: Uuid, initial: i64, available: i64) -> MenuItem {
            let mut item = MenuItem::new(self.menu_id, dish_id, BigDecimal::from(1), initial);
            item.available_count = available;
            item
        }

        fn plan(&self, current: &[MenuItem], requested: &[(Uuid, i64)]) -> LunchResult<MenuPlan> {
            let requested = requested.iter().copied().collect();
            plan_menu(self.provider_id, current, &requested, &self.dishes)
        }
    }

    #[test]
    fn partition_splits_three_ways() {
        let mut fx = Fixture::new();
        let (a, b, c) = (fx.dish(10), fx.dish(20), fx.dish(30));
        let current = vec![fx.item(a, 5, 5), fx.item(b, 5, 5)];
        let requested = BTreeMap::from([(b, 7), (c, 3)]);

        let diff = partition(&current, &requested);

        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.removed[0].dish_id, a);
        assert_eq!(diff.kept.len(), 1);
        assert_eq!((diff.kept[0].0.dish_id, diff.kept[0].1), (b, 7));
        assert_eq!(diff.added, vec![(c, 3)]);
    }

    #[test]
    fn new_menu_creates_items_with_price_snapshot() {
        let mut fx = Fixture::new();
        let a = fx.dish(42);

        let plan = fx.plan(&[], &[(a, 10)]).unwrap();

        assert_eq!(plan.create.len(), 1);
        assert_eq!(plan.create[0].count, 10);
        assert_eq!(plan.create[0].price, BigDecimal::from(42));
        assert!(plan.remove.is_empty() && plan.resize.is_empty());
    }

    #[test]
    fn unchanged_counts_produce_empty_plan() {
        let mut fx = Fixture::new();
        let a = fx.dish(10);
        let current = vec![fx.item(a, 10, 7)];

        let plan = fx.plan(&current, &[(a, 10)]).unwrap();

        assert!(plan.is_empty());
    }

    #[test]
    fn resize_shifts_available_by_delta() {
        let mut fx = Fixture::new();
        let a = fx.dish(10);
        let current = vec![fx.item(a, 10, 5)];

        let plan = fx.plan(&current, &[(a, 7)]).unwrap();

        assert_eq!(plan.resize.len(), 1);
        assert_eq!(plan.resize[0].to, Counts { initial: 7, available: 2 });
        assert_eq!(plan.resize[0].from, Counts { initial: 10, available: 5 });
    }

    #[test]
    fn shrinking_below_committed_is_rejected() {
        let mut fx = Fixture::new();
        let a = fx.dish(10);
        let current = vec![fx.item(a, 10, 5)];

        let err = fx.plan(&current, &[(a, 2)]).unwrap_err();

        assert_eq!(err, LunchError::CapacityConflict(BTreeMap::from([(a, 5)])));
    }

    #[test]
    fn removing_ordered_dish_is_rejected_with_all_offenders() {
        let mut fx = Fixture::new();
        let (a, b, c) = (fx.dish(10), fx.dish(10), fx.dish(10));
        let current = vec![fx.item(a, 10, 5), fx.item(b, 4, 1), fx.item(c, 3, 3)];

        // a shrinks below its 5 committed, b (3 committed) is dropped, c is free to go
        let err = fx.plan(&current, &[(a, 4)]).unwrap_err();

        assert_eq!(
            err,
            LunchError::CapacityConflict(BTreeMap::from([(a, 5), (b, 3)]))
        );
    }

    #[test]
    fn removing_unordered_dish_is_planned() {
        let mut fx = Fixture::new();
        let (a, b) = (fx.dish(10), fx.dish(10));
        let current = vec![fx.item(a, 10, 10), fx.item(b, 6, 6)];

        let plan = fx.plan(&current, &[(a, 10)]).unwrap();

        assert_eq!(plan.remove.len(), 1);
        assert_eq!(plan.remove[0].dish_id, b);
    }

    #[test]
    fn foreign_or_removed_dishes_are_not_found() {
        let mut fx = Fixture::new();
        let a = fx.dish(10);
        fx.dishes.get_mut(&a).unwrap().is_removed = true;
        assert!(matches!(fx.plan(&[], &[(a, 1)]), Err(LunchError::NotFound(_))));

        let stranger = Uuid::new_v4();
        assert!(matches!(
            fx.plan(&[], &[(stranger, 1)]),
            Err(LunchError::NotFound(_))
        ));

        let mut other = Fixture::new();
        let foreign = other.dish(10);
        fx.dishes.extend(other.dishes);
        assert!(matches!(fx.plan(&[], &[(foreign, 1)]), Err(LunchError::NotFound(_))));
    }

    #[test]
    fn requested_counts_validates_body() {
        let a = Uuid::new_v4();
        assert!(matches!(
            requested_counts(&[ItemCount::new(a, -1)]),
            Err(LunchError::Validation(_))
        ));
        assert!(matches!(
            requested_counts(&[ItemCount::new(a, 1), ItemCount::new(a, 2)]),
            Err(LunchError::Validation(_))
        ));
        assert_eq!(
            requested_counts(&[ItemCount::new(a, 0)]).unwrap(),
            BTreeMap::from([(a, 0)])
        );
    }

    #[test]
    fn clone_uses_initial_counts_and_skips_removed_dishes() {
        let mut fx = Fixture::new();
        let (a, b) = (fx.dish(10), fx.dish(10));
        fx.dishes.get_mut(&b).unwrap().is_removed = true;
        let source = vec![fx.item(a, 10, 2), fx.item(b, 5, 5)];

        assert_eq!(clone_counts(&source, &fx.dishes), vec![ItemCount::new(a, 10)]);
    }
}
