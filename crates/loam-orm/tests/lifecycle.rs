//! End-to-end lifecycle tests: migration, persistence, selection, and
//! relationship resolution against a real SQLite file.
//!
//! A fresh `Repository` over an existing database file starts with an empty
//! cache, so re-opening one is how these tests force hydration from rows
//! instead of cache hits.

use loam_orm::{
    EntityDef, Expr, FieldValue, OrmError, Reference, Repository, SharedInstance, SqlValue,
};

fn temp_db() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("lifecycle.db");
    (dir, path)
}

fn person_def() -> EntityDef {
    EntityDef::new("Person")
        .primary_key("id")
        .text("name")
        .integer("age")
        .real("height")
}

async fn person_repo(path: &std::path::Path) -> Repository {
    let mut repo = Repository::open(path);
    repo.register(person_def()).unwrap();
    repo.migrate("Person").await.unwrap();
    repo
}

fn make_person(repo: &Repository, name: &str, age: i64) -> SharedInstance {
    let object = repo.new_object("Person").unwrap();
    {
        let mut guard = object.lock().unwrap();
        guard.set("name", name).unwrap();
        guard.set("age", age).unwrap();
        guard.set("height", 1.7).unwrap();
    }
    object
}

fn get_text(object: &SharedInstance, field: &str) -> String {
    match object.lock().unwrap().get(field).unwrap() {
        FieldValue::Text(value) => value,
        other => panic!("expected text in '{field}', got {other:?}"),
    }
}

fn get_int(object: &SharedInstance, field: &str) -> i64 {
    match object.lock().unwrap().get(field).unwrap() {
        FieldValue::Integer(value) => value,
        other => panic!("expected integer in '{field}', got {other:?}"),
    }
}

fn object_id(object: &SharedInstance) -> i64 {
    object.lock().unwrap().id().expect("object is unsaved")
}

#[tokio::test]
async fn test_round_trip_returns_the_cached_object() {
    let (_dir, path) = temp_db();
    let mut repo = person_repo(&path).await;

    let alice = make_person(&repo, "Alice", 31);
    repo.insert_object(&alice).await.unwrap();
    let id = object_id(&alice);

    let key = repo.registry().get("Person").unwrap().column_ref("id").unwrap();
    let results = repo
        .select("Person")
        .unwrap()
        .filter(Expr::eq(key, id))
        .unwrap()
        .evaluate()
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert!(std::sync::Arc::ptr_eq(&results[0], &alice));
}

#[tokio::test]
async fn test_round_trip_hydrates_in_a_fresh_repository() {
    let (_dir, path) = temp_db();
    {
        let mut repo = person_repo(&path).await;
        let alice = make_person(&repo, "Alice", 31);
        repo.insert_object(&alice).await.unwrap();
    }

    let mut repo = Repository::open(&path);
    repo.register(person_def()).unwrap();
    let results = repo.select("Person").unwrap().evaluate().await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(get_text(&results[0], "name"), "Alice");
    assert_eq!(get_int(&results[0], "age"), 31);
    assert_eq!(object_id(&results[0]), 1);
}

#[tokio::test]
async fn test_update_does_not_duplicate_rows() {
    let (_dir, path) = temp_db();
    let mut repo = person_repo(&path).await;

    let alice = make_person(&repo, "Alice", 31);
    repo.insert_object(&alice).await.unwrap();
    alice.lock().unwrap().set("age", 32).unwrap();
    repo.insert_object(&alice).await.unwrap();

    let rows = repo.get_rows("SELECT id, age FROM Person").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][1], SqlValue::Integer(32));
}

#[tokio::test]
async fn test_selection_filters_and_limits() {
    let (_dir, path) = temp_db();
    let mut repo = person_repo(&path).await;

    for (name, age) in [("Ann", 20), ("Ben", 21), ("Cal", 22), ("Dee", 23)] {
        let object = make_person(&repo, name, age);
        repo.insert_object(&object).await.unwrap();
    }

    let schema = repo.registry().get("Person").unwrap();
    let age = schema.column_ref("age").unwrap();

    let young = repo
        .select("Person")
        .unwrap()
        .filter(Expr::or(
            Expr::eq(age.clone(), 20),
            Expr::eq(age.clone(), 21),
        ))
        .unwrap()
        .evaluate()
        .await
        .unwrap();
    assert_eq!(young.len(), 2);
    let mut names: Vec<String> = young.iter().map(|o| get_text(o, "name")).collect();
    names.sort();
    assert_eq!(names, ["Ann", "Ben"]);

    let below = repo
        .select("Person")
        .unwrap()
        .filter(Expr::lt(age, 22))
        .unwrap()
        .evaluate()
        .await
        .unwrap();
    assert_eq!(below.len(), 2);

    let capped = repo
        .select("Person")
        .unwrap()
        .limit(2)
        .unwrap()
        .evaluate()
        .await
        .unwrap();
    assert_eq!(capped.len(), 2);
}

#[tokio::test]
async fn test_duplicate_clauses_are_rejected() {
    let (_dir, path) = temp_db();
    let mut repo = person_repo(&path).await;
    let age = repo.registry().get("Person").unwrap().column_ref("age").unwrap();

    let err = repo
        .select("Person")
        .unwrap()
        .filter(Expr::eq(age.clone(), 20))
        .unwrap()
        .filter(Expr::eq(age, 21))
        .unwrap_err();
    assert!(matches!(err, OrmError::MultipleWhereClauses));

    let err = repo
        .select("Person")
        .unwrap()
        .limit(1)
        .unwrap()
        .limit(2)
        .unwrap_err();
    assert!(matches!(err, OrmError::MultipleLimitClauses));
}

#[tokio::test]
async fn test_builder_serializes_without_executing() {
    let (_dir, path) = temp_db();
    let mut repo = person_repo(&path).await;
    let age = repo.registry().get("Person").unwrap().column_ref("age").unwrap();

    let sql = repo
        .select("Person")
        .unwrap()
        .filter(Expr::gt(age, 18))
        .unwrap()
        .limit(3)
        .unwrap()
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        "SELECT Person.id, Person.name, Person.age, Person.height FROM Person \
         WHERE Person.age > 18 LIMIT 3"
    );
}

#[tokio::test]
async fn test_foreign_keys_resolve_recursively() {
    let (_dir, path) = temp_db();
    {
        let mut repo = Repository::open(&path);
        repo.register(EntityDef::new("Company").primary_key("id").text("name"))
            .unwrap();
        repo.register(
            EntityDef::new("Person")
                .primary_key("id")
                .text("name")
                .foreign_key("employer", "Company"),
        )
        .unwrap();
        repo.migrate("Company").await.unwrap();
        repo.migrate("Person").await.unwrap();

        let company = repo.new_object("Company").unwrap();
        company.lock().unwrap().set("name", "Globex").unwrap();
        repo.insert_object(&company).await.unwrap();

        let worker = repo.new_object("Person").unwrap();
        {
            let mut guard = worker.lock().unwrap();
            guard.set("name", "Alice").unwrap();
            guard.set("employer", FieldValue::reference(&company)).unwrap();
        }
        repo.insert_object(&worker).await.unwrap();
    }

    let mut repo = Repository::open(&path);
    repo.register(EntityDef::new("Company").primary_key("id").text("name"))
        .unwrap();
    repo.register(
        EntityDef::new("Person")
            .primary_key("id")
            .text("name")
            .foreign_key("employer", "Company"),
    )
    .unwrap();

    let people = repo.select("Person").unwrap().evaluate().await.unwrap();
    assert_eq!(people.len(), 1);

    let employer = match people[0].lock().unwrap().get("employer").unwrap() {
        FieldValue::Reference(Reference::Loaded(company)) => company,
        other => panic!("expected a loaded employer, got {other:?}"),
    };
    assert_eq!(get_text(&employer, "name"), "Globex");
}

#[tokio::test]
async fn test_list_field_junction_symmetry() {
    let (_dir, path) = temp_db();
    let mut repo = Repository::open(&path);
    repo.register(person_def()).unwrap();
    repo.register(
        EntityDef::new("Team")
            .primary_key("id")
            .text("title")
            .list("members", "Person"),
    )
    .unwrap();
    repo.migrate("Person").await.unwrap();
    repo.migrate("Team").await.unwrap();

    let a = make_person(&repo, "Ann", 20);
    let b = make_person(&repo, "Ben", 21);
    let c = make_person(&repo, "Cal", 22);
    for member in [&a, &b, &c] {
        repo.insert_object(member).await.unwrap();
    }

    let team = repo.new_object("Team").unwrap();
    {
        let mut guard = team.lock().unwrap();
        guard.set("title", "Owls").unwrap();
        guard
            .set("members", FieldValue::list(vec![a.clone(), b.clone()]))
            .unwrap();
    }
    repo.insert_object(&team).await.unwrap();

    let rows = repo
        .get_rows("SELECT members_id FROM Team_members")
        .await
        .unwrap();
    let mut linked: Vec<SqlValue> = rows.into_iter().flatten().collect();
    linked.sort_by_key(|value| match value {
        SqlValue::Integer(id) => *id,
        _ => i64::MAX,
    });
    assert_eq!(
        linked,
        vec![
            SqlValue::Integer(object_id(&a)),
            SqlValue::Integer(object_id(&b))
        ]
    );

    // Re-saving with a changed list rewrites the junction rows.
    team.lock()
        .unwrap()
        .set("members", FieldValue::list(vec![b.clone(), c.clone()]))
        .unwrap();
    repo.insert_object(&team).await.unwrap();

    let rows = repo
        .get_rows("SELECT members_id FROM Team_members")
        .await
        .unwrap();
    let mut linked: Vec<SqlValue> = rows.into_iter().flatten().collect();
    linked.sort_by_key(|value| match value {
        SqlValue::Integer(id) => *id,
        _ => i64::MAX,
    });
    assert_eq!(
        linked,
        vec![
            SqlValue::Integer(object_id(&b)),
            SqlValue::Integer(object_id(&c))
        ]
    );
}

#[tokio::test]
async fn test_unsaved_list_members_are_rejected() {
    let (_dir, path) = temp_db();
    let mut repo = Repository::open(&path);
    repo.register(person_def()).unwrap();
    repo.register(
        EntityDef::new("Team")
            .primary_key("id")
            .text("title")
            .list("members", "Person"),
    )
    .unwrap();
    repo.migrate("Person").await.unwrap();
    repo.migrate("Team").await.unwrap();

    let stray = make_person(&repo, "Stray", 19);
    let team = repo.new_object("Team").unwrap();
    team.lock()
        .unwrap()
        .set("members", FieldValue::list(vec![stray]))
        .unwrap();

    let err = repo.insert_object(&team).await.unwrap_err();
    assert!(matches!(err, OrmError::UnsavedReference(entity) if entity == "Person"));
}

#[tokio::test]
async fn test_deleting_an_owner_cleans_its_junction_rows() {
    let (_dir, path) = temp_db();
    let mut repo = Repository::open(&path);
    repo.register(person_def()).unwrap();
    repo.register(
        EntityDef::new("Team")
            .primary_key("id")
            .text("title")
            .list("members", "Person"),
    )
    .unwrap();
    repo.migrate("Person").await.unwrap();
    repo.migrate("Team").await.unwrap();

    let a = make_person(&repo, "Ann", 20);
    let b = make_person(&repo, "Ben", 21);
    repo.insert_object(&a).await.unwrap();
    repo.insert_object(&b).await.unwrap();

    let team = repo.new_object("Team").unwrap();
    {
        let mut guard = team.lock().unwrap();
        guard.set("title", "Owls").unwrap();
        guard
            .set("members", FieldValue::list(vec![a.clone(), b.clone()]))
            .unwrap();
    }
    repo.insert_object(&team).await.unwrap();

    repo.delete_object(&team).await.unwrap();

    let junction = repo
        .get_rows("SELECT members_id FROM Team_members")
        .await
        .unwrap();
    assert!(junction.is_empty());
    let teams = repo.get_rows("SELECT id FROM Team").await.unwrap();
    assert!(teams.is_empty());
    // The members' own rows are untouched.
    let people = repo.get_rows("SELECT id FROM Person").await.unwrap();
    assert_eq!(people.len(), 2);
}

#[tokio::test]
async fn test_delete_is_a_no_op_for_uncached_objects() {
    let (_dir, path) = temp_db();
    let mut repo = person_repo(&path).await;

    let alice = make_person(&repo, "Alice", 31);
    repo.insert_object(&alice).await.unwrap();
    let id = object_id(&alice);

    // A second in-memory object with the same id, never seen by the cache.
    let stranger = repo.new_object("Person").unwrap();
    stranger.lock().unwrap().set("id", id).unwrap();
    repo.delete_object(&stranger).await.unwrap();

    let rows = repo.get_rows("SELECT id FROM Person").await.unwrap();
    assert_eq!(rows.len(), 1);

    repo.delete_object(&alice).await.unwrap();
    let rows = repo.get_rows("SELECT id FROM Person").await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_derived_entities_extend_the_parent_table() {
    let (_dir, path) = temp_db();
    let mut repo = person_repo(&path).await;

    let alice = make_person(&repo, "Alice", 31);
    repo.insert_object(&alice).await.unwrap();

    repo.register(EntityDef::extending("Student", "Person").text("school"))
        .unwrap();
    repo.migrate("Student").await.unwrap();

    // The parent's rows survive the extension.
    let rows = repo.get_rows("SELECT id, school FROM Person").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][1], SqlValue::Null);

    let student = repo.new_object("Student").unwrap();
    {
        let mut guard = student.lock().unwrap();
        guard.set("name", "Sam").unwrap();
        guard.set("age", 19).unwrap();
        guard.set("school", "Miskatonic").unwrap();
    }
    repo.insert_object(&student).await.unwrap();

    let school = repo
        .registry()
        .get("Student")
        .unwrap()
        .column_ref("school")
        .unwrap();
    let students = repo
        .select("Student")
        .unwrap()
        .filter(Expr::eq(school, "Miskatonic"))
        .unwrap()
        .evaluate()
        .await
        .unwrap();
    assert_eq!(students.len(), 1);
    assert_eq!(get_text(&students[0], "name"), "Sam");
}

#[tokio::test]
async fn test_delete_model_leaves_referenced_tables_alone() {
    let (_dir, path) = temp_db();
    let mut repo = Repository::open(&path);
    repo.register(person_def()).unwrap();
    repo.register(
        EntityDef::new("Team")
            .primary_key("id")
            .text("title")
            .list("members", "Person"),
    )
    .unwrap();
    repo.migrate("Person").await.unwrap();
    repo.migrate("Team").await.unwrap();

    let a = make_person(&repo, "Ann", 20);
    repo.insert_object(&a).await.unwrap();

    repo.delete_model("Team").await.unwrap();

    let err = repo.get_rows("SELECT id FROM Team").await.unwrap_err();
    assert!(matches!(err, OrmError::Statement(_)));
    let err = repo.get_rows("SELECT members_id FROM Team_members").await.unwrap_err();
    assert!(matches!(err, OrmError::Statement(_)));

    let people = repo.get_rows("SELECT id FROM Person").await.unwrap();
    assert_eq!(people.len(), 1);
}

#[tokio::test]
async fn test_cyclic_lists_resolve_without_looping() {
    let (_dir, path) = temp_db();
    let friends_def = || {
        EntityDef::new("Person")
            .primary_key("id")
            .text("name")
            .list("friends", "Person")
    };

    {
        let mut repo = Repository::open(&path);
        repo.register(friends_def()).unwrap();
        repo.migrate("Person").await.unwrap();

        let a = repo.new_object("Person").unwrap();
        a.lock().unwrap().set("name", "Ann").unwrap();
        repo.insert_object(&a).await.unwrap();

        let b = repo.new_object("Person").unwrap();
        {
            let mut guard = b.lock().unwrap();
            guard.set("name", "Ben").unwrap();
            guard.set("friends", FieldValue::list(vec![a.clone()])).unwrap();
        }
        repo.insert_object(&b).await.unwrap();

        a.lock()
            .unwrap()
            .set("friends", FieldValue::list(vec![b.clone()]))
            .unwrap();
        repo.insert_object(&a).await.unwrap();
    }

    let mut repo = Repository::open(&path);
    repo.register(friends_def()).unwrap();
    let people = repo.select("Person").unwrap().evaluate().await.unwrap();
    assert_eq!(people.len(), 2);

    for object in &people {
        let friends = match object.lock().unwrap().get("friends").unwrap() {
            FieldValue::List(items) => items,
            other => panic!("expected a friends list, got {other:?}"),
        };
        assert_eq!(friends.len(), 1);
        let friend_name = get_text(&friends[0], "name");
        let own_name = get_text(object, "name");
        assert_ne!(friend_name, own_name);
    }
}
