use chrono::NaiveDate;
use orgchart_core::db::open_db_in_memory;
use orgchart_core::{
    DepartmentId, Employee, EmployeeId, EntityKind, HierarchyConfig, OrgService,
    OrgServiceError, ReportDepartmentPolicy, SqliteDepartmentRepository,
    SqliteEmployeeRepository, ValidationError,
};
use rusqlite::Connection;

type Service<'conn> =
    OrgService<SqliteDepartmentRepository<'conn>, SqliteEmployeeRepository<'conn>>;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
}

fn service(conn: &Connection) -> Service<'_> {
    let departments = SqliteDepartmentRepository::try_new(conn).unwrap();
    let employees = SqliteEmployeeRepository::try_new(conn).unwrap();
    OrgService::new(departments, employees).with_clock(today)
}

fn hire(service: &Service<'_>, first: &str, last: &str) -> EmployeeId {
    service
        .hire_employee(Employee::new(first, last))
        .unwrap()
        .id
        .unwrap()
}

fn ids(employees: &[Employee]) -> Vec<EmployeeId> {
    employees.iter().filter_map(|employee| employee.id).collect()
}

fn validation_errors(err: OrgServiceError) -> Vec<ValidationError> {
    match err {
        OrgServiceError::Validation(errors) => errors.into_vec(),
        other => panic!("expected validation error, got {other}"),
    }
}

#[test]
fn add_and_remove_employee_keep_both_sides_consistent() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let engineering = service.create_department("Engineering").unwrap().id.unwrap();
    let ana = hire(&service, "Ana", "Lee");

    service.add_employee(engineering, ana).unwrap();
    let loaded = service.get_employee(ana).unwrap().unwrap();
    assert_eq!(loaded.department_id, Some(engineering));
    assert_eq!(ids(&service.employees_of(engineering).unwrap()), vec![ana]);

    service.add_employee(engineering, ana).unwrap();
    assert_eq!(service.employees_of(engineering).unwrap().len(), 1);

    assert!(service.remove_employee(engineering, ana).unwrap());
    assert!(service.employees_of(engineering).unwrap().is_empty());
    let loaded = service.get_employee(ana).unwrap().unwrap();
    assert_eq!(loaded.department_id, None);

    assert!(!service.remove_employee(engineering, ana).unwrap());
}

#[test]
fn moving_employee_leaves_previous_department() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let sales = service.create_department("Sales").unwrap().id.unwrap();
    let engineering = service.create_department("Engineering").unwrap().id.unwrap();
    let ana = hire(&service, "Ana", "Lee");

    service.add_employee(sales, ana).unwrap();
    service.add_employee(engineering, ana).unwrap();

    assert!(service.employees_of(sales).unwrap().is_empty());
    assert_eq!(ids(&service.employees_of(engineering).unwrap()), vec![ana]);
    assert!(!service.remove_employee(sales, ana).unwrap());
}

#[test]
fn add_direct_report_inherits_manager_department() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let sales = service.create_department("Sales").unwrap().id.unwrap();
    let engineering = service.create_department("Engineering").unwrap().id.unwrap();
    let boss = hire(&service, "Bo", "Park");
    let ana = hire(&service, "Ana", "Lee");
    service.add_employee(engineering, boss).unwrap();
    service.add_employee(sales, ana).unwrap();

    service.add_direct_report(boss, ana).unwrap();

    let loaded = service.get_employee(ana).unwrap().unwrap();
    assert_eq!(loaded.manager_id, Some(boss));
    assert_eq!(loaded.department_id, Some(engineering));
    assert_eq!(ids(&service.direct_reports_of(boss).unwrap()), vec![ana]);
    assert!(service.employees_of(sales).unwrap().is_empty());
}

#[test]
fn manager_without_department_leaves_report_department_alone() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let sales = service.create_department("Sales").unwrap().id.unwrap();
    let boss = hire(&service, "Bo", "Park");
    let ana = hire(&service, "Ana", "Lee");
    service.add_employee(sales, ana).unwrap();

    service.add_direct_report(boss, ana).unwrap();

    let loaded = service.get_employee(ana).unwrap().unwrap();
    assert_eq!(loaded.manager_id, Some(boss));
    assert_eq!(loaded.department_id, Some(sales));
}

#[test]
fn preserve_policy_keeps_report_department() {
    let conn = open_db_in_memory().unwrap();
    let config = HierarchyConfig {
        report_department_policy: ReportDepartmentPolicy::Preserve,
    };
    let service = OrgService::configured(
        SqliteDepartmentRepository::try_new(&conn).unwrap(),
        SqliteEmployeeRepository::try_new(&conn).unwrap(),
        &config,
    )
    .with_clock(today);
    assert_eq!(service.policy(), ReportDepartmentPolicy::Preserve);

    let sales = service.create_department("Sales").unwrap().id.unwrap();
    let engineering = service.create_department("Engineering").unwrap().id.unwrap();
    let boss = hire(&service, "Bo", "Park");
    let ana = hire(&service, "Ana", "Lee");
    service.add_employee(engineering, boss).unwrap();
    service.add_employee(sales, ana).unwrap();

    service.add_direct_report(boss, ana).unwrap();

    let loaded = service.get_employee(ana).unwrap().unwrap();
    assert_eq!(loaded.manager_id, Some(boss));
    assert_eq!(loaded.department_id, Some(sales));
}

#[test]
fn remove_direct_report_only_detaches_matching_manager() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let boss = hire(&service, "Bo", "Park");
    let other = hire(&service, "Cy", "Ng");
    let ana = hire(&service, "Ana", "Lee");
    service.add_direct_report(boss, ana).unwrap();

    assert!(!service.remove_direct_report(other, ana).unwrap());
    assert_eq!(
        service.get_employee(ana).unwrap().unwrap().manager_id,
        Some(boss)
    );

    assert!(service.remove_direct_report(boss, ana).unwrap());
    assert_eq!(service.get_employee(ana).unwrap().unwrap().manager_id, None);
    assert!(service.direct_reports_of(boss).unwrap().is_empty());
    assert!(!service.remove_direct_report(boss, ana).unwrap());
}

#[test]
fn persisted_employee_roundtrips_with_hire_date_today() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let engineering = service.create_department("Engineering").unwrap().id.unwrap();

    let mut employee = Employee::new("Ana", "Lee")
        .with_email("ana@x.com")
        .with_hire_date(today());
    employee.department_id = Some(engineering);
    let created = service.hire_employee(employee).unwrap();

    let loaded = service.get_employee(created.id.unwrap()).unwrap().unwrap();
    assert_eq!(loaded.first_name, "Ana");
    assert_eq!(loaded.last_name, "Lee");
    assert_eq!(loaded.email.as_deref(), Some("ana@x.com"));
    assert_eq!(loaded.hire_date, Some(today()));
    assert_eq!(loaded.department_id, Some(engineering));
    assert_eq!(loaded, created);
}

#[test]
fn future_hire_date_is_rejected_and_nothing_is_written() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let tomorrow = today().succ_opt().unwrap();

    let err = service
        .hire_employee(Employee::new("Ana", "Lee").with_hire_date(tomorrow))
        .unwrap_err();
    assert_eq!(
        validation_errors(err),
        vec![ValidationError::FutureDate {
            field: "hire_date",
            date: tomorrow,
            today: today(),
        }]
    );
    assert!(service.list_employees(&Default::default()).unwrap().is_empty());
}

#[test]
fn invalid_employee_reports_every_violation() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let mut employee = Employee::new("  ", "Lee").with_email("ana-at-x");
    employee.department_id = Some(DepartmentId(404));
    let errors = validation_errors(service.hire_employee(employee).unwrap_err());

    assert_eq!(errors.len(), 3);
    assert!(errors.contains(&ValidationError::MissingRequiredField {
        entity: EntityKind::Employee,
        field: "first_name",
    }));
    assert!(errors.contains(&ValidationError::InvalidFormat {
        field: "email",
        value: "ana-at-x".to_string(),
    }));
    assert!(errors.contains(&ValidationError::ReferentialIntegrity {
        entity: EntityKind::Employee,
        field: "department_id",
        id: 404,
    }));
}

#[test]
fn blank_optional_text_is_stored_as_missing() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let first = service
        .hire_employee(Employee::new("Ana", "Lee").with_email("   ").with_title(" Lead "))
        .unwrap();
    let second = service
        .hire_employee(Employee::new("Bo", "Park").with_email(""))
        .unwrap();

    assert_eq!(first.email, None);
    assert_eq!(first.title.as_deref(), Some("Lead"));
    assert_eq!(second.email, None);
}

#[test]
fn duplicate_email_is_a_uniqueness_violation() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    service
        .hire_employee(Employee::new("Ana", "Lee").with_email("ana@x.com"))
        .unwrap();

    let err = service
        .hire_employee(Employee::new("Ann", "Lee").with_email("ana@x.com"))
        .unwrap_err();
    assert_eq!(
        validation_errors(err),
        vec![ValidationError::UniquenessViolation {
            entity: EntityKind::Employee,
            field: "email",
            value: "ana@x.com".to_string(),
        }]
    );
}

#[test]
fn duplicate_department_name_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    service.create_department("Engineering").unwrap();

    let err = service.create_department(" Engineering ").unwrap_err();
    assert_eq!(
        validation_errors(err),
        vec![ValidationError::UniquenessViolation {
            entity: EntityKind::Department,
            field: "name",
            value: "Engineering".to_string(),
        }]
    );
    assert_eq!(service.list_departments().unwrap().len(), 1);
}

#[test]
fn blank_department_name_is_required() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let err = service.create_department("   ").unwrap_err();
    assert_eq!(
        validation_errors(err),
        vec![ValidationError::MissingRequiredField {
            entity: EntityKind::Department,
            field: "name",
        }]
    );
}

#[test]
fn rename_department_keeps_own_name_and_rejects_taken_one() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let engineering = service.create_department("Engineering").unwrap().id.unwrap();
    service.create_department("Sales").unwrap();

    let renamed = service.rename_department(engineering, "Engineering").unwrap();
    assert_eq!(renamed.name, "Engineering");

    let err = service.rename_department(engineering, "Sales").unwrap_err();
    assert!(matches!(err, OrgServiceError::Validation(_)));

    let renamed = service.rename_department(engineering, "Platform").unwrap();
    assert_eq!(
        service.get_department(engineering).unwrap().unwrap(),
        renamed
    );
}

#[test]
fn reporting_cycles_are_rejected() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let ceo = hire(&service, "Ceo", "One");
    let vp = hire(&service, "Vp", "Two");
    let lead = hire(&service, "Lead", "Three");
    service.add_direct_report(ceo, vp).unwrap();
    service.add_direct_report(vp, lead).unwrap();

    let err = service.add_direct_report(lead, ceo).unwrap_err();
    assert_eq!(
        validation_errors(err),
        vec![ValidationError::CycleDetected {
            employee: ceo,
            manager: lead,
        }]
    );

    let err = service.add_direct_report(vp, vp).unwrap_err();
    assert!(matches!(err, OrgServiceError::Validation(_)));

    assert_eq!(service.get_employee(ceo).unwrap().unwrap().manager_id, None);
}

#[test]
fn update_employee_cannot_close_a_cycle() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let ceo = hire(&service, "Ceo", "One");
    let vp = hire(&service, "Vp", "Two");
    service.add_direct_report(ceo, vp).unwrap();

    let mut record = service.get_employee(ceo).unwrap().unwrap();
    record.manager_id = Some(vp);
    let err = service.update_employee(&record).unwrap_err();
    assert!(matches!(err, OrgServiceError::Validation(_)));

    let mut record = service.get_employee(vp).unwrap().unwrap();
    record.title = Some("VP".to_string());
    let updated = service.update_employee(&record).unwrap();
    assert_eq!(service.get_employee(vp).unwrap().unwrap(), updated);
}

#[test]
fn reporting_chain_and_all_reports_follow_manager_links() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let ceo = hire(&service, "Ceo", "One");
    let vp = hire(&service, "Vp", "Two");
    let lead = hire(&service, "Lead", "Three");
    let dev = hire(&service, "Dev", "Four");
    service.add_direct_report(ceo, vp).unwrap();
    service.add_direct_report(vp, lead).unwrap();
    service.add_direct_report(lead, dev).unwrap();

    assert_eq!(ids(&service.reporting_chain(dev).unwrap()), vec![lead, vp, ceo]);
    assert!(service.reporting_chain(ceo).unwrap().is_empty());
    assert_eq!(
        ids(&service.all_reports_of(ceo).unwrap()),
        vec![vp, lead, dev]
    );
}

#[test]
fn department_manager_must_be_a_member() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let engineering = service.create_department("Engineering").unwrap().id.unwrap();
    let ana = hire(&service, "Ana", "Lee");

    let err = service
        .assign_department_manager(engineering, Some(ana))
        .unwrap_err();
    assert!(matches!(
        err,
        OrgServiceError::ManagerOutsideDepartment { department, manager }
            if department == engineering && manager == ana
    ));

    service.add_employee(engineering, ana).unwrap();
    service
        .assign_department_manager(engineering, Some(ana))
        .unwrap();
    assert_eq!(
        service.get_department(engineering).unwrap().unwrap().manager_id,
        Some(ana)
    );

    service.assign_department_manager(engineering, None).unwrap();
    assert_eq!(
        service.get_department(engineering).unwrap().unwrap().manager_id,
        None
    );
}

#[test]
fn missing_rows_surface_as_not_found() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let ana = hire(&service, "Ana", "Lee");

    assert!(matches!(
        service.add_employee(DepartmentId(9), ana),
        Err(OrgServiceError::DepartmentNotFound(DepartmentId(9)))
    ));
    assert!(matches!(
        service.add_direct_report(EmployeeId(99), ana),
        Err(OrgServiceError::EmployeeNotFound(EmployeeId(99)))
    ));
    assert!(matches!(
        service.delete_employee(EmployeeId(99)),
        Err(OrgServiceError::EmployeeNotFound(EmployeeId(99)))
    ));
}

#[test]
fn deleting_department_removes_its_members() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let engineering = service.create_department("Engineering").unwrap().id.unwrap();
    let ana = hire(&service, "Ana", "Lee");
    let bo = hire(&service, "Bo", "Park");
    service.add_employee(engineering, ana).unwrap();
    service.add_direct_report(ana, bo).unwrap();

    service.delete_department(engineering).unwrap();

    assert!(service.get_department(engineering).unwrap().is_none());
    assert!(service.get_employee(ana).unwrap().is_none());
    assert!(service.get_employee(bo).unwrap().is_none());
}

fn managed_department(service: &Service<'_>, name: &str, manager: EmployeeId) -> DepartmentId {
    let department = service.create_department(name).unwrap().id.unwrap();
    service.add_employee(department, manager).unwrap();
    service
        .assign_department_manager(department, Some(manager))
        .unwrap();
    department
}

fn manager_of(service: &Service<'_>, department: DepartmentId) -> Option<EmployeeId> {
    service.get_department(department).unwrap().unwrap().manager_id
}

#[test]
fn manager_moved_to_other_department_stops_managing_old_one() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let bo = hire(&service, "Bo", "Park");
    let engineering = managed_department(&service, "Engineering", bo);
    let sales = service.create_department("Sales").unwrap().id.unwrap();

    service.add_employee(sales, bo).unwrap();

    assert_eq!(manager_of(&service, engineering), None);
    assert_eq!(
        service.get_employee(bo).unwrap().unwrap().department_id,
        Some(sales)
    );
}

#[test]
fn re_adding_manager_to_own_department_keeps_role() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let bo = hire(&service, "Bo", "Park");
    let engineering = managed_department(&service, "Engineering", bo);

    service.add_employee(engineering, bo).unwrap();

    assert_eq!(manager_of(&service, engineering), Some(bo));
}

#[test]
fn removed_manager_leaves_department_without_manager() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let bo = hire(&service, "Bo", "Park");
    let ana = hire(&service, "Ana", "Lee");
    let engineering = managed_department(&service, "Engineering", bo);
    service.add_employee(engineering, ana).unwrap();

    assert!(service.remove_employee(engineering, ana).unwrap());
    assert_eq!(manager_of(&service, engineering), Some(bo));

    assert!(service.remove_employee(engineering, bo).unwrap());
    assert_eq!(manager_of(&service, engineering), None);
}

#[test]
fn inherited_report_department_ends_previous_management() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let ceo = hire(&service, "Ceo", "One");
    let bo = hire(&service, "Bo", "Park");
    managed_department(&service, "Board", ceo);
    let engineering = managed_department(&service, "Engineering", bo);

    service.add_direct_report(ceo, bo).unwrap();

    assert_eq!(manager_of(&service, engineering), None);
    let board = service.get_employee(ceo).unwrap().unwrap().department_id;
    assert_eq!(service.get_employee(bo).unwrap().unwrap().department_id, board);
    assert_eq!(manager_of(&service, board.unwrap()), Some(ceo));
}

#[test]
fn preserved_report_department_keeps_management() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn).with_policy(ReportDepartmentPolicy::Preserve);
    let ceo = hire(&service, "Ceo", "One");
    let bo = hire(&service, "Bo", "Park");
    managed_department(&service, "Board", ceo);
    let engineering = managed_department(&service, "Engineering", bo);

    service.add_direct_report(ceo, bo).unwrap();

    assert_eq!(manager_of(&service, engineering), Some(bo));
}

#[test]
fn updating_manager_department_ends_previous_management() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let bo = hire(&service, "Bo", "Park");
    let engineering = managed_department(&service, "Engineering", bo);
    let sales = service.create_department("Sales").unwrap().id.unwrap();

    let mut record = service.get_employee(bo).unwrap().unwrap();
    record.title = Some("Lead".to_string());
    service.update_employee(&record).unwrap();
    assert_eq!(manager_of(&service, engineering), Some(bo));

    record.department_id = Some(sales);
    service.update_employee(&record).unwrap();
    assert_eq!(manager_of(&service, engineering), None);

    record.department_id = None;
    service.update_employee(&record).unwrap();
    assert_eq!(service.get_employee(bo).unwrap().unwrap().department_id, None);
}
