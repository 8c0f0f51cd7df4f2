mod common;

use common::{both, fill, fixture, fixture_with, titles};
use memorm::prelude::*;

// ============================================================================
// Scoping
// ============================================================================

#[test]
fn test_all_without_options_is_self() {
    both(|f| {
        let all = f.articles.all(&QueryOptions::new()).unwrap();
        assert!(all.same(&f.articles));
        assert_eq!(all.query(), f.articles.query());
    });
}

#[test]
fn test_all_with_options_is_new_scope() {
    both(|f| {
        let narrowed = f.articles.all(&QueryOptions::new().fields(["id", "content"])).unwrap();
        assert!(!narrowed.same(&f.articles));
        assert_ne!(narrowed.query(), f.articles.query());

        let entries = narrowed.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].same(&f.article));
        // members of a narrowed view do not point back at the parent
        assert!(!entries[0].collection().unwrap().same(&f.articles));
    });
}

#[test]
fn test_offset_past_limit_is_range_error() {
    both(|f| {
        let root = f.db.all("Article", &QueryOptions::new()).unwrap();
        let limited = root.all(&QueryOptions::new().limit(10)).unwrap();

        let err = limited.all(&QueryOptions::new().offset(10)).unwrap_err();
        assert!(matches!(err, DbError::RangeError(_)));
        assert!(limited.all(&QueryOptions::new().offset(9)).is_ok());
    });
}

// ============================================================================
// Positional reads
// ============================================================================

#[test]
fn test_at_does_not_load() {
    let f = fixture(false);
    let resource = f.articles.at(0).unwrap().unwrap();

    assert!(resource.same(&f.article));
    assert!(!f.articles.is_loaded());
    assert!(resource.collection().unwrap().same(&f.articles));
    assert!(f.articles.at(1).unwrap().is_none());
    assert!(f.articles.at(-2).unwrap().is_none());
}

#[test]
fn test_at_loads_without_partial_loading() {
    let f = common::fixture_with(RepositoryConfig::default().partial_loading(false), false);
    assert!(f.articles.at(0).unwrap().unwrap().same(&f.article));
    assert!(f.articles.is_loaded());
}

#[test]
fn test_first_and_last_relate_to_self() {
    both(|f| {
        let first = f.articles.first().unwrap().unwrap();
        let last = f.articles.last().unwrap().unwrap();
        assert!(first.same(&f.article));
        assert!(last.same(&f.article));
        assert!(first.collection().unwrap().same(&f.articles));
    });
}

#[test]
fn test_first_and_last_honor_pending_members() {
    both(|f| {
        let prepended = f.db.new_resource("Article", &attrs! { "title" => "Prepended" }).unwrap();
        let appended = f.db.new_resource("Article", &attrs! { "title" => "Appended" }).unwrap();
        f.articles.unshift([prepended.clone()]).unwrap();
        f.articles.push([appended.clone()]).unwrap();

        assert!(f.articles.first().unwrap().unwrap().same(&prepended));
        assert!(f.articles.last().unwrap().unwrap().same(&appended));

        let first_two = f.articles.first_n(2).unwrap();
        assert_eq!(titles(&first_two), vec!["Prepended", "Sample Article"]);
        let last_two = f.articles.last_n(2).unwrap();
        assert_eq!(titles(&last_two), vec!["Sample Article", "Appended"]);
        assert_eq!(titles(&f.articles), vec!["Prepended", "Sample Article", "Appended"]);
    });
}

#[test]
fn test_first_n_is_detached() {
    both(|f| {
        let first = f.articles.first_n(1).unwrap();
        assert!(!first.same(&f.articles));
        assert_eq!(first.query().limit(), Some(1));

        let entries = first.entries().unwrap();
        assert!(entries[0].same(&f.article));
        assert!(!entries[0].collection().unwrap().same(&f.articles));
    });
}

#[test]
fn test_last_n_on_root() {
    both(|f| {
        let root = f.db.all("Article", &QueryOptions::new()).unwrap();
        let last = root.last_n(2).unwrap();
        assert_eq!(titles(&last), vec!["Sample Article", "Other Article"]);
    });
}

#[test]
fn test_last_n_reload_keeps_rows_and_order() {
    both(|f| {
        fill(&f.db, 4);
        let root = f.db.all("Article", &QueryOptions::new()).unwrap();
        if f.articles.is_loaded() {
            root.entries().unwrap();
        }

        let last = root.last_n(3).unwrap();
        let expected = vec!["Sample Article", "Other Article", "Filler 3"];
        assert_eq!(titles(&last), expected);
        assert_eq!(last.query().offset(), 1);
        assert_eq!(last.query().limit(), Some(3));
        assert_eq!(last.query().order(), root.query().order());

        last.reload(&QueryOptions::new()).unwrap();
        assert_eq!(titles(&last), expected);
    });
}

#[test]
fn test_last_n_matching_reload_keeps_rows_and_order() {
    both(|f| {
        fill(&f.db, 5);
        let root = f.db.all("Article", &QueryOptions::new()).unwrap();
        if f.articles.is_loaded() {
            root.entries().unwrap();
        }

        let last = root.last_n_matching(2, &QueryOptions::new().lt("id", 5)).unwrap();
        assert_eq!(titles(&last), vec!["Other Article", "Filler 3"]);

        last.reload(&QueryOptions::new()).unwrap();
        assert_eq!(titles(&last), vec!["Other Article", "Filler 3"]);
    });
}

#[test]
fn test_last_n_of_windowed_scope() {
    let f = fixture(false);
    fill(&f.db, 6);
    let page = f.db.all("Article", &QueryOptions::new().offset(1).limit(4)).unwrap();

    let last = page.last_n(2).unwrap();
    let keys: Vec<Key> = last.entries().unwrap().iter().map(Resource::key).collect();
    assert_eq!(keys, vec![Key::from(4), Key::from(5)]);
    assert!(!page.is_loaded());
    assert_eq!(page.last().unwrap().unwrap().key(), Key::from(5));
}

#[test]
fn test_raw_matching_reads_unloaded_properties() {
    for loaded in [false, true] {
        let f = fixture_with(RepositoryConfig::default().identity_map(false), false);
        let root = f.db.all("Article", &QueryOptions::new()).unwrap();
        if loaded {
            let entries = root.entries().unwrap();
            assert!(!entries[1].attribute_loaded("content"));
        }
        let raw = QueryOptions::new().raw("content = ?", vec![Value::from("Sample")]);

        let first = root.first_matching(&raw).unwrap().unwrap();
        assert_eq!(first.key(), Key::from(2));
        let last = root.last_matching(&raw).unwrap().unwrap();
        assert_eq!(last.key(), Key::from(2));
        assert_eq!(titles(&root.first_n_matching(5, &raw).unwrap()), vec!["Sample Article"]);
        assert_eq!(titles(&root.last_n_matching(5, &raw).unwrap()), vec!["Sample Article"]);
    }
}

#[test]
fn test_first_and_last_matching() {
    both(|f| {
        let root = f.db.all("Article", &QueryOptions::new()).unwrap();
        if f.articles.is_loaded() {
            root.entries().unwrap();
        }
        let found = root
            .first_matching(&QueryOptions::new().eq("content", "Sample"))
            .unwrap()
            .unwrap();
        assert!(found.same(&f.article));
        assert!(found.collection().unwrap().same(&root));

        let last = root
            .last_matching(&QueryOptions::new().gt("id", 1))
            .unwrap()
            .unwrap();
        assert!(last.same(&f.other));

        let first_two = root
            .first_n_matching(2, &QueryOptions::new().gt("id", 1))
            .unwrap();
        assert_eq!(titles(&first_two), vec!["Sample Article", "Other Article"]);

        let last_one = root
            .last_n_matching(1, &QueryOptions::new().lt("id", 3))
            .unwrap();
        assert_eq!(titles(&last_one), vec!["Sample Article"]);
    });
}

#[test]
fn test_slice_returns_detached_collection() {
    let f = fixture(true);
    fill(&f.db, 11);
    let root = f.db.all("Article", &QueryOptions::new()).unwrap();
    assert_eq!(root.len().unwrap(), 11);

    let slice = root.slice(SliceSpec::new(5, 5)).unwrap().unwrap();
    assert!(!slice.same(&root));
    let entries = slice.entries().unwrap();
    assert_eq!(entries.len(), 5);
    assert_eq!(entries[0].key(), Key::from(6));
    assert_eq!(entries[4].key(), Key::from(10));

    slice.delete(&entries[0]).unwrap();
    assert_eq!(slice.len().unwrap(), 4);
    assert_eq!(root.len().unwrap(), 11);
}

#[test]
fn test_slice_bounds() {
    both(|f| {
        let root = f.db.all("Article", &QueryOptions::new()).unwrap();
        assert!(root.slice(SliceSpec::new(4, 1)).unwrap().is_none());
        assert!(root.slice(SliceSpec::new(3, 1)).unwrap().unwrap().is_empty().unwrap());
        assert_eq!(titles(&root.slice(1..=2).unwrap().unwrap()), vec!["Sample Article", "Other Article"]);
        assert_eq!(titles(&root.slice(SliceSpec::new(-1, 5)).unwrap().unwrap()), vec!["Other Article"]);
    });
}

// ============================================================================
// Key lookup
// ============================================================================

#[test]
fn test_get_within_scope() {
    both(|f| {
        let key = f.article.key();
        let found = f.articles.get(key).unwrap().unwrap();
        assert!(found.same(&f.article));
        assert!(found.collection().unwrap().same(&f.articles));

        // in storage but outside the scope
        assert!(f.articles.get(f.other.key()).unwrap().is_none());
    });
}

#[test]
fn test_get_typecasts_and_rejects_blank_keys() {
    both(|f| {
        assert!(f.articles.get("2").unwrap().unwrap().same(&f.article));
        assert!(f.articles.get(Value::Null).unwrap().is_none());
        assert!(f.articles.get("").unwrap().is_none());
    });
}

#[test]
fn test_get_respects_window() {
    both(|f| {
        let root = f.db.all("Article", &QueryOptions::new()).unwrap();
        let first = root.all(&QueryOptions::new().limit(1)).unwrap();
        assert!(first.get(3).unwrap().is_none());
        assert!(first.get(1).unwrap().unwrap().same(&f.original));

        let rest = root.all(&QueryOptions::new().offset(1)).unwrap();
        assert!(rest.get(1).unwrap().is_none());
        assert!(rest.get(3).unwrap().unwrap().same(&f.other));
    });
}

#[test]
fn test_get_required_miss() {
    both(|f| {
        let err = f.articles.get_required(99).unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
        assert_eq!(err.to_string(), "Could not find Article with key [99] in collection");
    });
}

#[test]
fn test_get_finds_pending_members() {
    let f = fixture(false);
    let created = f.db.create("Article", &attrs! { "title" => "Elsewhere" }).unwrap();
    f.articles.push([created.clone()]).unwrap();

    assert!(f.articles.get(created.key()).unwrap().unwrap().same(&created));
    assert!(!f.articles.is_loaded());
}

// ============================================================================
// Mutation
// ============================================================================

#[test]
fn test_push_claims_and_delete_orphans() {
    both(|f| {
        let resource = f.db.new_resource("Article", &attrs! { "title" => "Title" }).unwrap();
        f.articles.push([resource.clone()]).unwrap();
        assert!(resource.collection().unwrap().same(&f.articles));

        let removed = f.articles.delete(&resource).unwrap().unwrap();
        assert!(removed.same(&resource));
        assert!(resource.collection().is_none());
        assert!(f.articles.delete(&resource).unwrap().is_none());
    });
}

#[test]
fn test_add_and_concat() {
    both(|f| {
        let a = f.db.new_resource("Article", &attrs! { "title" => "A" }).unwrap();
        let b = f.db.new_resource("Article", &attrs! { "title" => "B" }).unwrap();
        f.articles.add(a).unwrap().concat([b.clone()]).unwrap();

        assert_eq!(titles(&f.articles), vec!["Sample Article", "A", "B"]);
        assert!(b.collection().unwrap().same(&f.articles));
    });
}

#[test]
fn test_push_rejects_other_models() {
    let f = fixture(false);
    f.db.define(Model::new("Comment").property(Property::serial("id"))).unwrap();
    let comment = f.db.new_resource("Comment", &attrs! {}).unwrap();
    assert!(f.articles.push([comment]).is_err());
}

#[test]
fn test_insert_with_negative_offset() {
    both(|f| {
        let a = f.db.new_resource("Article", &attrs! { "title" => "A" }).unwrap();
        let b = f.db.new_resource("Article", &attrs! { "title" => "B" }).unwrap();
        f.articles.insert(-1, [a]).unwrap();
        f.articles.insert(0, [b.clone()]).unwrap();

        assert_eq!(titles(&f.articles), vec!["B", "Sample Article", "A"]);
        assert!(b.collection().unwrap().same(&f.articles));

        let c = f.db.new_resource("Article", &attrs! { "title" => "C" }).unwrap();
        assert!(f.articles.insert(9, [c]).is_err());
    });
}

#[test]
fn test_pop_and_shift() {
    both(|f| {
        let popped = f.articles.pop().unwrap().unwrap();
        assert!(popped.same(&f.article));
        assert!(popped.collection().is_none());
        assert!(f.articles.is_empty().unwrap());

        // empty collections return nothing
        assert!(f.articles.pop().unwrap().is_none());
        assert!(f.articles.shift().unwrap().is_none());
    });
}

#[test]
fn test_pop_pending_does_not_load() {
    let f = fixture(false);
    let resource = f.db.new_resource("Article", &attrs! { "title" => "Pending" }).unwrap();
    f.articles.push([resource.clone()]).unwrap();

    assert!(f.articles.pop().unwrap().unwrap().same(&resource));
    assert!(!f.articles.is_loaded());
    assert!(resource.collection().is_none());
}

#[test]
fn test_shift_orphans() {
    both(|f| {
        let shifted = f.articles.shift().unwrap().unwrap();
        assert!(shifted.same(&f.article));
        assert!(shifted.collection().is_none());
    });
}

#[test]
fn test_delete_at() {
    both(|f| {
        assert!(f.articles.delete_at(5).unwrap().is_none());
        let removed = f.articles.delete_at(-1).unwrap().unwrap();
        assert!(removed.same(&f.article));
        assert!(removed.collection().is_none());
    });
}

#[test]
fn test_delete_if_returns_self() {
    both(|f| {
        let returned = f.articles.delete_if(|_| true).unwrap();
        assert!(returned.same(&f.articles));
        assert!(f.articles.is_empty().unwrap());
        assert!(f.article.collection().is_none_or(|owner| !owner.same(&f.articles)));

        // nothing left to remove, still self
        assert!(f.articles.delete_if(|_| true).unwrap().same(&f.articles));
    });
}

#[test]
fn test_reject_returns_none_when_nothing_removed() {
    both(|f| {
        assert!(f.articles.reject(|_| false).unwrap().is_none());
        assert_eq!(f.articles.len().unwrap(), 1);

        let returned = f.articles.reject(|_| true).unwrap().unwrap();
        assert!(returned.same(&f.articles));
        assert!(f.articles.is_empty().unwrap());
    });
}

#[test]
fn test_clear_orphans_without_fetching() {
    both(|f| {
        let was_loaded = f.articles.is_loaded();
        let resource = f.db.new_resource("Article", &attrs! { "title" => "Pending" }).unwrap();
        f.articles.push([resource.clone()]).unwrap();

        let fetches = f.db.gateway().stats().fetches;
        assert!(f.articles.clear().same(&f.articles));
        assert!(f.articles.is_empty().unwrap());
        assert_eq!(f.db.gateway().stats().fetches, fetches);

        assert!(resource.collection().is_none());
        if was_loaded {
            assert!(f.article.collection().is_none());
        }
    });
}

#[test]
fn test_replace_with_resources_and_attributes() {
    both(|f| {
        f.articles
            .replace([
                Entry::from(attrs! { "title" => "Replaced", "content" => "One" }),
                Entry::from(attrs! { "content" => "Two" }),
                Entry::from(f.other.clone()),
            ])
            .unwrap();

        let entries = f.articles.entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].get("title").unwrap(), Value::from("Replaced"));
        assert_eq!(entries[0].get("content").unwrap(), Value::from("One"));
        // scope defaults seed attribute entries
        assert_eq!(entries[1].get("title").unwrap(), Value::from("Sample Article"));
        assert!(entries[1].is_new());
        assert!(entries[2].same(&f.other));

        for entry in &entries {
            assert!(entry.collection().unwrap().same(&f.articles));
        }
        assert!(f.article.collection().is_none());
    });
}

#[test]
fn test_replace_attribute_round_trip() {
    let f = fixture(false);
    let first = attrs! { "title" => "Sample Article", "content" => "A" };
    let second = attrs! { "title" => "Sample Article", "content" => "B" };
    f.articles.replace([first.clone(), second.clone()]).unwrap();

    let collected: Vec<Attributes> = f
        .articles
        .entries()
        .unwrap()
        .iter()
        .map(|resource| {
            resource
                .attributes()
                .into_iter()
                .filter(|(_, value)| !value.is_null())
                .collect()
        })
        .collect();
    assert_eq!(collected, vec![first, second]);
}

#[test]
fn test_set_and_splice_return_the_new_resource() {
    both(|f| {
        let replacement = f.db.new_resource("Article", &attrs! { "title" => "New" }).unwrap();
        let returned = f.articles.set(0, replacement.clone()).unwrap();
        assert!(returned.same(&replacement));
        assert!(replacement.collection().unwrap().same(&f.articles));
        assert!(f.article.collection().is_none());

        let spliced = f.db.new_resource("Article", &attrs! { "title" => "Spliced" }).unwrap();
        let returned = f.articles.splice(0..1, spliced.clone()).unwrap();
        assert!(returned.same(&spliced));
        assert!(replacement.collection().is_none());
        assert_eq!(titles(&f.articles), vec!["Spliced"]);

        let appended = f.db.new_resource("Article", &attrs! { "title" => "Appended" }).unwrap();
        f.articles.set(1, appended).unwrap();
        assert_eq!(f.articles.len().unwrap(), 2);

        let out_of_range = f.db.new_resource("Article", &attrs! { "title" => "X" }).unwrap();
        assert!(f.articles.set(5, out_of_range).is_err());
    });
}

#[test]
fn test_set_same_resource_stays_claimed() {
    both(|f| {
        f.articles.set(0, f.article.clone()).unwrap();
        assert!(f.article.collection().unwrap().same(&f.articles));
    });
}

#[test]
fn test_slice_remove() {
    both(|f| {
        let root = f.db.all("Article", &QueryOptions::new()).unwrap();
        let removed = root.slice_remove(1..3).unwrap().unwrap();

        assert_eq!(titles(&removed), vec!["Sample Article", "Other Article"]);
        assert_eq!(titles(&root), vec!["Original Article"]);
        assert!(!f.other.collection().unwrap().same(&root));
        assert!(root.slice_remove(SliceSpec::new(5, 1)).unwrap().is_none());
    });
}

#[test]
fn test_map_in_place() {
    both(|f| {
        let other = f.other.clone();
        f.articles.map_in_place(|_| other.clone()).unwrap();

        assert!(f.articles.first().unwrap().unwrap().same(&f.other));
        assert!(f.other.collection().unwrap().same(&f.articles));
        assert!(f.article.collection().is_none());
    });
}

#[test]
fn test_sort_and_reverse() {
    both(|f| {
        let root = f.db.all("Article", &QueryOptions::new()).unwrap();
        root.sort_by(|a, b| b.key().0[0].sort_cmp(&a.key().0[0])).unwrap();
        assert_eq!(titles(&root), vec!["Other Article", "Sample Article", "Original Article"]);

        root.sort().unwrap();
        assert_eq!(titles(&root), vec!["Original Article", "Sample Article", "Other Article"]);

        let reversed = root.reverse().unwrap();
        assert!(!reversed.same(&root));
        assert_eq!(reversed.query().order(), &[Order::desc("id")]);
        assert_eq!(titles(&reversed), vec!["Other Article", "Sample Article", "Original Article"]);
    });
}

#[test]
fn test_reverse_unloaded_is_lazy() {
    let f = fixture(false);
    let root = f.db.all("Article", &QueryOptions::new()).unwrap();
    let reversed = root.reverse().unwrap();
    assert!(!reversed.is_loaded());
    assert_eq!(titles(&reversed), vec!["Other Article", "Sample Article", "Original Article"]);
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_create_inherits_scope_defaults() {
    both(|f| {
        let resource = f.articles.create(&attrs! { "content" => "X" }).unwrap();

        assert!(!resource.is_new());
        assert_eq!(resource.get("title").unwrap(), Value::from("Sample Article"));
        assert_eq!(resource.get("content").unwrap(), Value::from("X"));
        assert!(f.articles.last().unwrap().unwrap().same(&resource));
    });
}

#[test]
fn test_failed_create_is_not_appended() {
    both(|f| {
        f.db.gateway().fail_next(GatewayOp::Create);
        let resource = f.articles.create(&attrs! { "content" => "X" }).unwrap();

        assert!(resource.is_new());
        assert!(resource.collection().is_none());
        assert_eq!(f.articles.len().unwrap(), 1);
    });
}

#[test]
fn test_new_resource_is_appended_unsaved() {
    both(|f| {
        let resource = f.articles.new_resource(&attrs! { "content" => "Draft" }).unwrap();
        assert!(resource.is_new());
        assert_eq!(resource.get("title").unwrap(), Value::from("Sample Article"));
        assert!(f.articles.last().unwrap().unwrap().same(&resource));
    });
}

#[test]
fn test_first_or_new_and_first_or_create() {
    both(|f| {
        let found = f
            .articles
            .first_or_create(&attrs! { "content" => "Sample" }, &attrs! {})
            .unwrap();
        assert!(found.same(&f.article));

        let built = f
            .articles
            .first_or_new(
                &attrs! { "content" => "Missing" },
                &attrs! { "content" => "Override" },
            )
            .unwrap();
        assert!(built.is_new());
        assert_eq!(built.get("content").unwrap(), Value::from("Override"));
        assert!(built.collection().unwrap().same(&f.articles));

        let created = f
            .articles
            .first_or_create(&attrs! { "content" => "Fresh" }, &attrs! {})
            .unwrap();
        assert!(!created.is_new());
        assert_eq!(created.get("title").unwrap(), Value::from("Sample Article"));
    });
}

#[test]
fn test_update_members() {
    both(|f| {
        assert!(f.articles.update(&attrs! { "content" => "Changed" }, &[]).unwrap());
        assert_eq!(f.article.get("content").unwrap(), Value::from("Changed"));

        assert!(f
            .articles
            .update(&attrs! { "title" => "Ignored", "content" => "Allowed" }, &["content"])
            .unwrap());
        assert_eq!(f.article.get("title").unwrap(), Value::from("Sample Article"));
        assert_eq!(f.article.get("content").unwrap(), Value::from("Allowed"));
    });
}

#[test]
fn test_update_reports_failures() {
    both(|f| {
        f.db.gateway().fail_next(GatewayOp::Update);
        assert!(!f.articles.update(&attrs! { "content" => "Changed" }, &[]).unwrap());

        // unchecked updates skip validation only
        let db = &f.db;
        db.define(
            Model::new("Note")
                .property(Property::serial("id"))
                .property(Property::string("body").max_length(3)),
        )
        .unwrap();
        let notes = db.all("Note", &QueryOptions::new()).unwrap();
        notes.create(&attrs! { "body" => "abc" }).unwrap();
        assert!(!notes.update(&attrs! { "body" => "too long" }, &[]).unwrap());
        assert!(notes.update_unchecked(&attrs! { "body" => "too long" }, &[]).unwrap());
    });
}

#[test]
fn test_destroy_empties_collection() {
    both(|f| {
        assert!(f.articles.destroy().unwrap());
        assert!(f.articles.is_empty().unwrap());
        assert!(f.article.is_destroyed());
        assert!(f.article.collection().is_none());
        assert_eq!(f.db.gateway().row_count("Article"), 2);
    });
}

#[test]
fn test_destroy_deletes_dirty_members() {
    both(|f| {
        f.article.set("content", "Unsaved").unwrap();
        assert!(f.articles.destroy().unwrap());

        assert!(f.articles.is_empty().unwrap());
        assert!(f.article.is_destroyed());
        assert!(f.article.collection().is_none());
        assert_eq!(f.db.gateway().row_count("Article"), 2);
        assert!(f.db.get("Article", 2).unwrap().is_none());
    });
}

#[test]
fn test_destroy_unchecked_empties_collection() {
    both(|f| {
        f.article.set("content", "Unsaved").unwrap();
        assert!(f.articles.destroy_unchecked().unwrap());
        assert!(f.articles.is_empty().unwrap());
        assert_eq!(f.db.gateway().row_count("Article"), 2);
    });
}

#[test]
fn test_save_persists_claimed_members() {
    both(|f| {
        let resource = f.articles.new_resource(&attrs! { "content" => "Draft" }).unwrap();
        assert!(f.articles.save().unwrap());
        assert!(!resource.is_new());
        assert_eq!(f.db.gateway().row_count("Article"), 4);
    });
}

#[test]
fn test_save_skips_resources_claimed_elsewhere() {
    both(|f| {
        let resource = f.articles.new_resource(&attrs! { "content" => "Draft" }).unwrap();
        f.other_articles.push([resource.clone()]).unwrap();

        assert!(f.articles.save().unwrap());
        assert!(resource.is_new());

        assert!(f.other_articles.save().unwrap());
        assert!(!resource.is_new());
    });
}

#[test]
fn test_save_reports_failures() {
    both(|f| {
        f.articles.new_resource(&attrs! { "content" => "Draft" }).unwrap();
        f.db.gateway().fail_next(GatewayOp::Create);
        assert!(!f.articles.save().unwrap());
    });
}

// ============================================================================
// Reload
// ============================================================================

#[test]
fn test_reload_is_idempotent() {
    both(|f| {
        let first: Vec<Key> = f.articles.reload(&QueryOptions::new()).unwrap()
            .entries().unwrap().iter().map(Resource::key).collect();
        let second: Vec<Key> = f.articles.reload(&QueryOptions::new()).unwrap()
            .entries().unwrap().iter().map(Resource::key).collect();
        assert_eq!(first, second);
        assert!(f.articles.is_loaded());
    });
}

#[test]
fn test_reload_keeps_identity_and_drops_unsaved() {
    both(|f| {
        let draft = f.articles.new_resource(&attrs! { "content" => "Draft" }).unwrap();
        f.articles.reload(&QueryOptions::new()).unwrap();

        let entries = f.articles.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].same(&f.article));
        assert!(draft.collection().is_none());
    });
}

#[test]
fn test_reload_discards_attribute_changes() {
    both(|f| {
        f.article.set("title", "Scratch").unwrap();
        f.articles.reload(&QueryOptions::new()).unwrap();
        assert_eq!(f.article.get("title").unwrap(), Value::from("Sample Article"));
        assert!(!f.article.is_dirty());
    });
}

#[test]
fn test_reload_with_fields() {
    both(|f| {
        f.articles.reload(&QueryOptions::new().fields(["content"])).unwrap();
        assert!(f.article.attribute_loaded("title"));
        assert!(f.article.attribute_loaded("content"));

        let model = f.articles.model();
        let content_only = Query::with_options(
            f.db.repository().name(),
            &model,
            &QueryOptions::new().fields(["content"]),
        )
        .unwrap();
        f.articles.reload_with(&content_only).unwrap();
        assert!(!f.article.attribute_loaded("title"));
        assert!(f.article.attribute_loaded("content"));
        // lazily loaded again on access
        assert_eq!(f.article.get("title").unwrap(), Value::from("Sample Article"));
    });
}

// ============================================================================
// Rendering and delegation
// ============================================================================

#[test]
fn test_inspect() {
    both(|f| {
        assert_eq!(
            f.articles.inspect().unwrap(),
            r#"[#<Article id=2 title="Sample Article" content="Sample" original_id=1>]"#
        );

        f.articles.new_resource(&attrs! {}).unwrap();
        assert!(f
            .articles
            .inspect()
            .unwrap()
            .ends_with(r#"#<Article id=nil title="Sample Article" content=nil original_id=nil>]"#));
    });
}

#[test]
fn test_dispatch_model_method() {
    both(|f| {
        let value = f.articles.dispatch("base_model", &QueryOptions::new()).unwrap();
        assert_eq!(value.into_value(), Some(Value::from("Article")));
    });
}

#[test]
fn test_dispatch_relationships() {
    both(|f| {
        let originals = f
            .articles
            .dispatch("original", &QueryOptions::new())
            .unwrap()
            .into_collection()
            .unwrap();
        let entries = originals.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].same(&f.original));

        let plural = f.articles.dispatch("originals", &QueryOptions::new()).unwrap();
        assert_eq!(titles(&plural.into_collection().unwrap()), vec!["Original Article"]);

        let root = f.db.all("Article", &QueryOptions::new().eq("title", "Original Article")).unwrap();
        let revisions = root
            .dispatch("revisions", &QueryOptions::new().fields(["content"]))
            .unwrap()
            .into_collection()
            .unwrap();
        assert_eq!(titles(&revisions), vec!["Sample Article"]);
    });
}

#[test]
fn test_dispatch_includes_unsaved_members() {
    both(|f| {
        let limited = f.articles.all(&QueryOptions::new().limit(1)).unwrap();
        limited
            .new_resource(&attrs! { "original_id" => f.other.key().0[0].clone() })
            .unwrap();

        let originals = limited
            .dispatch("original", &QueryOptions::new())
            .unwrap()
            .into_collection()
            .unwrap();
        assert_eq!(titles(&originals), vec!["Original Article", "Other Article"]);
    });
}

#[test]
fn test_dispatch_unknown_name() {
    both(|f| {
        let err = f.articles.dispatch("publish", &QueryOptions::new()).unwrap_err();
        assert!(matches!(err, DbError::NoSuchMethod { .. }));

        assert!(f.articles.responds_to("push"));
        assert!(f.articles.responds_to("base_model"));
        assert!(f.articles.responds_to("revisions"));
        assert!(!f.articles.responds_to("publish"));
    });
}
