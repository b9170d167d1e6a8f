//! `Mergeable` implementations for the structured spec field types.
//!
//! Every sub-field follows the scalar policy unless noted.

use super::{fill_nested, fill_scalar, fill_text, merge_keyed, Mergeable};
use crate::crd::{
    AppImage, BackupSchedule, ConfigEntry, HomePage, Route, RouteIngress, SourcedEnv, Volume,
};

impl Mergeable for AppImage {
    fn merge_from(&mut self, template: &Self) {
        fill_text(&mut self.repository, &template.repository);
        fill_text(&mut self.tag, &template.tag);
        fill_text(&mut self.pull_policy, &template.pull_policy);
    }
}

impl Mergeable for SourcedEnv {
    fn merge_from(&mut self, template: &Self) {
        fill_text(&mut self.external_secret, &template.external_secret);
        fill_text(&mut self.secret, &template.secret);
        fill_text(&mut self.config_map, &template.config_map);
        fill_text(&mut self.key, &template.key);
    }
}

impl Mergeable for Route {
    fn merge_from(&mut self, template: &Self) {
        fill_scalar(&mut self.port, &template.port);
        fill_scalar(&mut self.target_port, &template.target_port);
        fill_text(&mut self.protocol, &template.protocol);
        // nested
        fill_nested(&mut self.ingress, &template.ingress);
    }
}

impl Mergeable for RouteIngress {
    fn merge_from(&mut self, template: &Self) {
        fill_text(&mut self.domain, &template.domain);
        fill_scalar(&mut self.auth, &template.auth);
    }
}

impl Mergeable for Volume {
    fn merge_from(&mut self, template: &Self) {
        fill_text(&mut self.host_path, &template.host_path);
        fill_scalar(&mut self.empty_dir, &template.empty_dir);
        fill_text(&mut self.path, &template.path);
        fill_text(&mut self.size, &template.size);
        fill_text(&mut self.storage_class, &template.storage_class);
        fill_text(&mut self.existing_claim, &template.existing_claim);
        fill_scalar(&mut self.backup, &template.backup);
    }
}

impl Mergeable for ConfigEntry {
    fn merge_from(&mut self, template: &Self) {
        fill_text(&mut self.file_name, &template.file_name);
        fill_text(&mut self.content, &template.content);
        fill_text(&mut self.existing, &template.existing);
        merge_keyed(&mut self.secrets, &template.secrets);
        fill_text(&mut self.dir_path, &template.dir_path);
        fill_scalar(&mut self.copy_over, &template.copy_over);
    }
}

impl Mergeable for HomePage {
    fn merge_from(&mut self, template: &Self) {
        fill_text(&mut self.description, &template.description);
        fill_text(&mut self.section, &template.section);
        fill_text(&mut self.href, &template.href);
        fill_text(&mut self.icon, &template.icon);
        fill_text(&mut self.name, &template.name);
        fill_text(&mut self.groups, &template.groups);
    }
}

impl Mergeable for BackupSchedule {
    fn merge_from(&mut self, template: &Self) {
        fill_text(&mut self.frequency, &template.frequency);
        fill_scalar(&mut self.retain, &template.retain);
    }
}
