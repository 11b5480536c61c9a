// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of acad-cmd and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

/// Helper library evaluated in front of every library call.
///
/// Definitions sit behind a version guard, so re-sending the library to a document that already
/// loaded it only costs the guard check. Bump `*mcp-lib-rev*` whenever a definition changes.
///
/// Output contract: single-shot entry points print exactly one `[MCP:JSON]` line holding an
/// `{"ok": ...}` envelope. Selection entry points print `start`, one `item_begin` per object and
/// `done`, each stamped with the caller's `req_id`. Runtime errors inside an entry point become an
/// `{"ok":false}` envelope, or a `done` event carrying `error` for selections.
pub const LIBRARY: &str = r#"(if (/= *mcp-lib-rev* 4)
  (progn
    (defun mcp--json-escape (s / i c out)
      (setq out "" i 1)
      (while (<= i (strlen s))
        (setq c (substr s i 1))
        (setq out
          (strcat out
            (cond
              ((= c "\\") "\\\\")
              ((= c "\"") "\\\"")
              ((= c "\n") "\\n")
              ((= c "\r") "\\r")
              ((= c "\t") "\\t")
              (T c))))
        (setq i (1+ i)))
      out)

    (defun mcp--json-quote (s) (strcat "\"" (mcp--json-escape s) "\""))

    (defun mcp--json-real (r / s)
      (setq s (rtos r 2 15))
      (if (vl-string-search "." s)
        (setq s (vl-string-right-trim "." (vl-string-right-trim "0" s))))
      (if (or (= s "") (= s "-")) "0" s))

    (defun mcp--json-value (v)
      (cond
        ((= v T) "true")
        ((null v) "false")
        ((and (= (type v) 'SYM) (= (strcase (vl-symbol-name v)) "MCPNULL")) "null")
        ((= (type v) 'STR) (mcp--json-quote v))
        ((= (type v) 'INT) (itoa v))
        ((= (type v) 'REAL) (mcp--json-real v))
        ((= (type v) 'ENAME) (mcp--json-quote (cdr (assoc 5 (entget v)))))
        ((and (= (type v) 'LIST) (cdr v) (atom (cdr v))) (mcp--json-arr (list (car v) (cdr v))))
        ((= (type v) 'LIST) (mcp--json-arr v))
        (T (mcp--json-quote (vl-princ-to-string v)))))

    (defun mcp--json-arr (lst / out)
      (setq out "")
      (foreach v lst
        (setq out (strcat out (if (= out "") "" ",") (mcp--json-value v))))
      (strcat "[" out "]"))

    (defun mcp--emit-json (json)
      (prompt (strcat "\n" "[MCP:JSON]" json))
      (princ))

    (defun mcp--emit-ok (body) (mcp--emit-json (strcat "{\"ok\":true" body "}")))

    (defun mcp--emit-err (msg)
      (mcp--emit-json (strcat "{\"ok\":false,\"error\":" (mcp--json-value msg) "}")))

    (defun mcp--emit-event (req event body)
      (mcp--emit-json
        (strcat "{\"req_id\":" (mcp--json-quote req) ",\"event\":" (mcp--json-quote event) body "}")))

    (defun mcp--system-name-p (name / u)
      (setq u (strcase name))
      (or (wcmatch u "ACAD_*") (wcmatch u "AEC_*") (wcmatch u "ADSK_*") (wcmatch u "A$*")))

    (defun mcp--dict-by-name (name / r)
      (setq r (dictsearch (namedobjdict) name))
      (if (and r (= (cdr (assoc 0 r)) "DICTIONARY")) (cdr (assoc -1 r))))

    (defun mcp--dict-entries (d / el out key)
      (setq el (entget d) out nil)
      (while el
        (if (= (caar el) 3)
          (progn
            (setq key (cdar el) el (cdr el))
            (while (and el (/= (caar el) 350)) (setq el (cdr el)))
            (if el (setq out (cons (cons key (cdar el)) out) el (cdr el))))
          (setq el (cdr el))))
      (reverse out))

    (defun mcp--entry-type (obj) (if obj (cdr (assoc 0 (entget obj))) 'MCPNULL))

    (defun mcp--ensure-dict (name / d)
      (cond
        ((mcp--dict-by-name name))
        (T
          (setq d (entmakex (list (cons 0 "DICTIONARY") (cons 100 "AcDbDictionary"))))
          (dictadd (namedobjdict) name d)
          d)))

    (defun mcp--xrec-by-key (d key / r)
      (setq r (dictsearch d key))
      (if (and r (= (cdr (assoc 0 r)) "XRECORD")) (cdr (assoc -1 r))))

    (defun mcp--xrec-user-pair-p (p)
      (and (numberp (car p)) (>= (car p) 1) (not (member (car p) '(5 100 102 280 330 360)))))

    (defun mcp--xrec-value-json (code v)
      (cond
        ((and (>= code 290) (<= code 299) (numberp v)) (if (equal v 0) "false" "true"))
        ((equal v "*MCPNULL*") "null")
        (T (mcp--json-value v))))

    (defun mcp--xrec-values-json (e / out)
      (setq out "")
      (foreach p (entget e)
        (if (mcp--xrec-user-pair-p p)
          (setq out
            (strcat out (if (= out "") "" ",")
              "[" (itoa (car p)) "," (mcp--xrec-value-json (car p) (cdr p)) "]"))))
      (strcat "[" out "]"))

    (defun mcp--guarded (fn args / r)
      (setq r (vl-catch-all-apply fn args))
      (if (vl-catch-all-error-p r)
        (mcp--emit-err (vl-catch-all-error-message r)))
      (princ))

    (defun mcp--guarded-selection (req fn args / r)
      (setq r (vl-catch-all-apply fn args))
      (if (vl-catch-all-error-p r)
        (mcp--emit-event req "done"
          (strcat ",\"count\":0,\"error\":" (mcp--json-quote (vl-catch-all-error-message r)))))
      (princ))

    (defun mcp--dict-list (/ out)
      (setq out "")
      (foreach kv (mcp--dict-entries (namedobjdict))
        (if (= (mcp--entry-type (cdr kv)) "DICTIONARY")
          (setq out
            (strcat out (if (= out "") "" ",")
              "{\"name\":" (mcp--json-quote (car kv))
              ",\"is_system_guess\":" (mcp--json-value (mcp--system-name-p (car kv)))
              ",\"system_reason\":" (mcp--json-value (if (mcp--system-name-p (car kv)) "prefix" 'MCPNULL))
              "}"))))
      (mcp--emit-ok (strcat ",\"dicts\":[" out "]")))

    (defun mcp--dict-keys (dictName / d keys entries)
      (setq d (mcp--dict-by-name dictName))
      (if (not d)
        (mcp--emit-ok ",\"found\":false,\"keys\":[],\"entries\":[]")
        (progn
          (setq keys "" entries "")
          (foreach kv (mcp--dict-entries d)
            (setq keys (strcat keys (if (= keys "") "" ",") (mcp--json-quote (car kv))))
            (setq entries
              (strcat entries (if (= entries "") "" ",")
                "{\"key\":" (mcp--json-quote (car kv))
                ",\"type\":" (mcp--json-value (mcp--entry-type (cdr kv))) "}")))
          (mcp--emit-ok (strcat ",\"found\":true,\"keys\":[" keys "],\"entries\":[" entries "]")))))

    (defun mcp--xrecord-get (dictName key / d x)
      (setq d (mcp--dict-by-name dictName))
      (setq x (if d (mcp--xrec-by-key d key)))
      (if (not x)
        (mcp--emit-ok ",\"found\":false,\"values\":[]")
        (mcp--emit-ok (strcat ",\"found\":true,\"values\":" (mcp--xrec-values-json x)))))

    ;; The replacement is built before the old record is touched.
    (defun mcp--xrecord-set (dictName key values overwrite / d old new)
      (setq d (mcp--ensure-dict dictName))
      (setq old (mcp--xrec-by-key d key))
      (cond
        ((and old (not overwrite)) (mcp--emit-err "Key already exists"))
        ((not (setq new (entmakex (append (list (cons 0 "XRECORD") (cons 100 "AcDbXrecord")) values))))
          (mcp--emit-err "Invalid xrecord values"))
        (T
          (if old (progn (dictremove d key) (entdel old)))
          (dictadd d key new)
          (mcp--emit-ok ",\"written\":true"))))

    (defun mcp--xrecord-delete (dictName key / d old)
      (setq d (mcp--dict-by-name dictName))
      (setq old (if d (mcp--xrec-by-key d key)))
      (if (not old)
        (mcp--emit-ok ",\"deleted\":false")
        (progn
          (dictremove d key)
          (entdel old)
          (mcp--emit-ok ",\"deleted\":true"))))

    (defun mcp--dict-delete (dictName recursive / d entries n)
      (setq d (mcp--dict-by-name dictName))
      (cond
        ((not d) (mcp--emit-ok ",\"deleted\":false,\"deleted_entries\":0"))
        ((and (not recursive) (setq entries (mcp--dict-entries d)))
          (mcp--emit-err "Dictionary not empty (set recursive=true to delete)"))
        (T
          (setq n 0)
          (foreach kv (mcp--dict-entries d)
            (dictremove d (car kv))
            (if (cdr kv) (entdel (cdr kv)))
            (setq n (1+ n)))
          (dictremove (namedobjdict) dictName)
          (entdel d)
          (mcp--emit-ok (strcat ",\"deleted\":true,\"deleted_entries\":" (itoa n))))))

    (defun mcp--selection-report (req ss maxn / n i el)
      (setq n (if ss (sslength ss) 0))
      (if (and maxn (> n maxn)) (setq n maxn))
      (setq i 0)
      (while (< i n)
        (setq el (entget (ssname ss i)))
        (mcp--emit-event req "item_begin"
          (strcat ",\"index\":" (itoa i)
            ",\"handle\":" (mcp--json-value (cdr (assoc 5 el)))
            ",\"type\":" (mcp--json-value (cdr (assoc 0 el)))))
        (setq i (1+ i)))
      (mcp--emit-event req "done" (strcat ",\"count\":" (itoa n)))
      (princ))

    (defun mcp--selection-implied (req flt maxn / ss)
      (mcp--emit-event req "start" (strcat ",\"phase\":\"implied\",\"errno\":" (itoa (getvar "ERRNO"))))
      (setq ss (if flt (ssget "_I" flt) (ssget "_I")))
      (mcp--selection-report req ss maxn))

    ;; Esc at the prompt still finishes the request, as a cancelled empty selection.
    (defun mcp--selection-prompt (req msg flt maxn / ss)
      (mcp--emit-event req "start" (strcat ",\"phase\":\"prompt\",\"errno\":" (itoa (getvar "ERRNO"))))
      (prompt (strcat "\n" msg))
      (setq ss (vl-catch-all-apply 'ssget (append (if (= maxn 1) (list "_:S")) (if flt (list flt)))))
      (if (vl-catch-all-error-p ss)
        (mcp--emit-event req "done"
          (strcat ",\"count\":0,\"cancelled\":true,\"reason\":"
            (mcp--json-quote (vl-catch-all-error-message ss))))
        (mcp--selection-report req ss maxn)))

    (defun mcp-dict-list () (mcp--guarded 'mcp--dict-list nil))
    (defun mcp-dict-keys (dictName) (mcp--guarded 'mcp--dict-keys (list dictName)))
    (defun mcp-xrecord-get (dictName key) (mcp--guarded 'mcp--xrecord-get (list dictName key)))
    (defun mcp-xrecord-set (dictName key values overwrite)
      (mcp--guarded 'mcp--xrecord-set (list dictName key values overwrite)))
    (defun mcp-xrecord-delete (dictName key)
      (mcp--guarded 'mcp--xrecord-delete (list dictName key)))
    (defun mcp-dict-delete (dictName recursive)
      (mcp--guarded 'mcp--dict-delete (list dictName recursive)))
    (defun mcp-selection-implied-lite (req flt maxn)
      (mcp--guarded-selection req 'mcp--selection-implied (list req flt maxn)))
    (defun mcp-selection-prompt (req msg flt maxn)
      (mcp--guarded-selection req 'mcp--selection-prompt (list req msg flt maxn)))

    (setq *mcp-lib-rev* 4)))"#;
