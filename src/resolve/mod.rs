//! Response-key resolution: merges the Service-level vocabulary with the
//! Service Request's override layer into the ordered rule set one run
//! normalizes with.

use std::collections::HashSet;

use crate::config::{ChildBinding, EffectiveSr, ResponseKey, Service};

/// Ordered extraction rules for one run.
#[derive(Debug, Clone, Default)]
pub struct ResolvedKeys {
    keys: Vec<ResponseKey>,
    /// Names contributed by the Service Request's own layer. Child-request
    /// bindings are Sr-scoped: only these keys' bindings run.
    sr_names: HashSet<String>,
}

impl ResolvedKeys {
    /// Sr-specific entry if present, else the Service-level default — the
    /// Sr entry wins in full, never a per-field merge. Rules are ordered by
    /// search priority (highest first), then declaration order.
    pub fn resolve(service: &Service, effective: &EffectiveSr) -> Self {
        let mut keys: Vec<ResponseKey> = Vec::with_capacity(
            service.response_keys.len() + effective.response_keys.len(),
        );

        for key in &service.response_keys {
            match effective.response_keys.iter().find(|o| o.name == key.name) {
                Some(override_key) => keys.push(override_key.clone()),
                None => keys.push(key.clone()),
            }
        }
        for key in &effective.response_keys {
            if !keys.iter().any(|k| k.name == key.name) {
                keys.push(key.clone());
            }
        }

        keys.sort_by_key(|k| std::cmp::Reverse(k.search_priority));
        let sr_names = effective
            .response_keys
            .iter()
            .map(|k| k.name.clone())
            .collect();
        Self { keys, sr_names }
    }

    /// Enabled child-request bindings, with the key each hangs off.
    pub fn child_bindings(&self) -> Vec<(&str, &ChildBinding)> {
        self.keys
            .iter()
            .filter(|k| self.sr_names.contains(&k.name))
            .filter_map(|k| {
                k.child
                    .as_ref()
                    .filter(|c| !c.disable_request)
                    .map(|c| (k.name.as_str(), c))
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn all(&self) -> &[ResponseKey] {
        &self.keys
    }

    /// Rules applied per list item.
    pub fn item_keys(&self) -> impl Iterator<Item = &ResponseKey> {
        self.keys.iter().filter(|k| k.list_item)
    }

    /// Rules applied once against the whole payload into extraData.
    pub fn meta_keys(&self) -> impl Iterator<Item = &ResponseKey> {
        self.keys.iter().filter(|k| !k.list_item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PaginationType, SrType};
    use std::collections::{BTreeMap, HashMap};

    fn service_with_keys(keys: Vec<ResponseKey>) -> Service {
        Service {
            id: 1,
            name: "catalog".to_string(),
            category: None,
            response_keys: keys,
        }
    }

    fn effective_with_overrides(keys: Vec<ResponseKey>) -> EffectiveSr {
        EffectiveSr {
            id: 1,
            name: "products".to_string(),
            provider_id: 1,
            service_id: 1,
            sr_type: SrType::List,
            pagination_type: Some(PaginationType::Page),
            endpoint: "/v1/products".to_string(),
            method: "GET".to_string(),
            headers: HashMap::new(),
            query: BTreeMap::new(),
            body: None,
            list_key: Some("results".to_string()),
            list_item_repeater_key: None,
            list_format_option: None,
            per_page: 10,
            response_keys: keys,
        }
    }

    #[test]
    fn sr_override_wins_wholesale() {
        let service = service_with_keys(vec![
            ResponseKey::mapped("title", "name"),
            ResponseKey::mapped("price", "cost"),
        ]);
        let mut override_title = ResponseKey::mapped("title", "attributes.display_name");
        override_title.searchable = true;
        let effective = effective_with_overrides(vec![override_title]);

        let resolved = ResolvedKeys::resolve(&service, &effective);
        let title = resolved
            .all()
            .iter()
            .find(|k| k.name == "title")
            .unwrap();
        assert_eq!(title.value.as_deref(), Some("attributes.display_name"));
        assert!(title.searchable);
        assert_eq!(resolved.all().len(), 2);
    }

    #[test]
    fn search_priority_orders_rules() {
        let mut low = ResponseKey::mapped("low", "a");
        low.search_priority = 1;
        let mut high = ResponseKey::mapped("high", "b");
        high.search_priority = 9;
        let service = service_with_keys(vec![low, high]);
        let effective = effective_with_overrides(vec![]);

        let resolved = ResolvedKeys::resolve(&service, &effective);
        assert_eq!(resolved.all()[0].name, "high");
    }

    #[test]
    fn child_bindings_are_sr_scoped() {
        let binding = ChildBinding {
            service_request_id: 2,
            action: Default::default(),
            single_request: false,
            disable_request: false,
            request_response_keys: Default::default(),
            response_response_keys: Default::default(),
            join_parent_key: None,
            join_child_key: None,
        };

        // A binding on a service-level key does not run for Srs that do not
        // override that key themselves.
        let mut service_key = ResponseKey::mapped("details", "id");
        service_key.child = Some(binding.clone());
        let service = service_with_keys(vec![service_key]);
        let resolved = ResolvedKeys::resolve(&service, &effective_with_overrides(vec![]));
        assert!(resolved.child_bindings().is_empty());

        // The same binding on the Sr's own layer runs.
        let mut sr_key = ResponseKey::mapped("details", "id");
        sr_key.child = Some(binding);
        let resolved =
            ResolvedKeys::resolve(&service, &effective_with_overrides(vec![sr_key]));
        assert_eq!(resolved.child_bindings().len(), 1);
    }

    #[test]
    fn meta_and_item_keys_split_on_list_item_flag() {
        let service = service_with_keys(vec![
            ResponseKey::mapped("title", "name"),
            ResponseKey::meta("total_items", "meta.count"),
        ]);
        let effective = effective_with_overrides(vec![]);
        let resolved = ResolvedKeys::resolve(&service, &effective);
        assert_eq!(resolved.item_keys().count(), 1);
        assert_eq!(resolved.meta_keys().count(), 1);
    }
}
