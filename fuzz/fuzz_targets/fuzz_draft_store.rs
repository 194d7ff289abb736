#![no_main]

//! Fuzz target for the draft store.
//!
//! Runs arbitrary sequences of save/update/delete against an in-memory
//! store and checks the table against a model after every step.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::collections::BTreeMap;

use konnekt::db::DraftStore;
use konnekt::models::{Draft, NewDraft};

#[derive(Arbitrary, Debug)]
struct FuzzDraft {
    title: String,
    description: String,
    category_id: String,
    municipality_id: String,
    address: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    image_name: Option<String>,
    created_at: i64,
}

impl FuzzDraft {
    fn into_new_draft(self) -> NewDraft {
        NewDraft {
            title: self.title,
            description: self.description,
            category_id: self.category_id,
            municipality_id: self.municipality_id,
            address: self.address,
            latitude: self.latitude.map(|v| v.to_string()),
            longitude: self.longitude.map(|v| v.to_string()),
            image_name: self.image_name,
            image_data_url: None,
            created_at: self.created_at,
        }
    }
}

#[derive(Arbitrary, Debug)]
enum Op {
    Save(FuzzDraft),
    Update(u8, FuzzDraft),
    Delete(u8),
}

fuzz_target!(|ops: Vec<Op>| {
    let store = match DraftStore::open_in_memory() {
        Ok(s) => s,
        Err(_) => return,
    };
    let mut model: BTreeMap<i64, NewDraft> = BTreeMap::new();

    for op in ops.into_iter().take(64) {
        match op {
            Op::Save(d) => {
                let draft = d.into_new_draft();
                if let Ok(id) = store.save(&draft) {
                    assert!(!model.contains_key(&id), "id {} handed out twice", id);
                    model.insert(id, draft);
                }
            }
            Op::Update(slot, d) => {
                let id = i64::from(slot % 8) + 1;
                let draft = Draft {
                    id,
                    fields: d.into_new_draft(),
                };
                if store.update(&draft).is_ok() {
                    model.insert(id, draft.fields);
                }
            }
            Op::Delete(slot) => {
                let id = i64::from(slot % 8) + 1;
                store.delete(id).expect("delete must not fail");
                model.remove(&id);
            }
        }

        let stored: BTreeMap<i64, NewDraft> = store
            .list()
            .expect("list must not fail")
            .into_iter()
            .map(|d| (d.id, d.fields))
            .collect();
        assert_eq!(stored.len(), model.len());
        for (id, fields) in &model {
            let got = &stored[id];
            assert_eq!(got.title, fields.title);
            assert_eq!(got.created_at, fields.created_at);
        }
    }
});
