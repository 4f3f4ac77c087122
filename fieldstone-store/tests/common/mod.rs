use fieldstone_model::{
    DefaultOn, DefaultValue, DefinitionCache, EntityDefinition, EntityFactory, Field,
};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

pub fn open_store() -> Arc<Mutex<Connection>> {
    fieldstone_store::open_in_memory().unwrap()
}

pub fn task_def() -> EntityDefinition {
    EntityDefinition::new("task")
        .with_field(Field::text("name"))
        .with_field(Field::text("notes"))
        .with_field(Field::grouping("status"))
        .with_field(Field::grouping_multi("labels"))
        .with_field(Field::object("owner", "user"))
        .with_field(Field::object("project", "project"))
        .with_field(Field::object_multi("watchers", "user"))
        .with_field(Field::number("points"))
        .with_field(Field::bool("done"))
        .with_field(Field::timestamp("due"))
        .with_field(
            Field::timestamp("ts_entered")
                .readonly()
                .with_default(DefaultOn::Create, DefaultValue::Now),
        )
}

pub fn user_def() -> EntityDefinition {
    EntityDefinition::new("user").with_field(Field::text("name"))
}

pub fn project_def() -> EntityDefinition {
    EntityDefinition::new("project").with_field(Field::text("name"))
}

pub fn folder_def() -> EntityDefinition {
    EntityDefinition::new("folder")
        .with_field(Field::text("name"))
        .with_field(Field::object("parent_id", "folder"))
        .with_parent_field("parent_id")
}

pub fn definitions() -> Arc<DefinitionCache> {
    let cache = DefinitionCache::new();
    cache.insert(task_def());
    cache.insert(user_def());
    cache.insert(project_def());
    cache.insert(folder_def());
    Arc::new(cache)
}

pub fn factory() -> Arc<EntityFactory> {
    Arc::new(EntityFactory::new())
}
